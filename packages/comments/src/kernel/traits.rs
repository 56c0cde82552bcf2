// Trait definitions for dependency injection
//
// BaseStorage is the only interface the API layer depends on. Backends are
// selected at construction time (see deps.rs) and passed down as
// Arc<dyn BaseStorage>.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::{StorageError, StorageResult};
use crate::common::{CommentId, Page, PostId, SubscriptionId};
use crate::domains::posts::{Comment, Post};

// =============================================================================
// Subscriptions
// =============================================================================

/// Buffer size of every subscriber channel, backend and bridge alike.
pub const SUBSCRIBER_CAPACITY: usize = 1;

/// Identifies one live subscriber registration and the signal that stops it.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    pub post_id: PostId,
    cancel: CancellationToken,
}

impl SubscriptionHandle {
    pub fn new(post_id: PostId, cancel: CancellationToken) -> Self {
        Self {
            id: SubscriptionId::new(),
            post_id,
            cancel,
        }
    }

    /// Stop backend work feeding this subscription.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token the backend task selects on.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Raw backend stream of comments for one post.
///
/// The receiver closes when the backend drops the subscriber (a slow consumer
/// on the transient store, a dead connection on the durable store).
#[derive(Debug)]
pub struct CommentSubscription {
    pub handle: SubscriptionHandle,
    pub receiver: mpsc::Receiver<Comment>,
}

impl CommentSubscription {
    /// Wait for the next comment.
    ///
    /// Returns `SubscriptionClosed` once the backend side has gone away.
    pub async fn next_comment(&mut self) -> StorageResult<Comment> {
        self.receiver
            .recv()
            .await
            .ok_or(StorageError::SubscriptionClosed)
    }
}

// =============================================================================
// Storage Trait (Infrastructure - posts, comments, live comment feed)
// =============================================================================

#[async_trait]
pub trait BaseStorage: Send + Sync {
    /// Create a post. Only fails when the storage medium does.
    async fn add_post(
        &self,
        title: &str,
        content: &str,
        allow_comments: bool,
    ) -> StorageResult<Post>;

    /// All posts. An empty store is reported as `NoPosts`, not an empty list.
    async fn get_all_posts(&self) -> StorageResult<Vec<Post>>;

    async fn get_post_by_id(&self, id: PostId) -> StorageResult<Post>;

    /// Validate, persist, then notify live subscribers of the post.
    async fn add_comment(
        &self,
        post_id: PostId,
        parent_id: Option<CommentId>,
        content: &str,
    ) -> StorageResult<Comment>;

    /// Newest-first page of a post's comments.
    ///
    /// A post without any comments is reported as `NoComments`. Once comments
    /// exist, an offset past the end yields an empty page.
    async fn get_comments_by_post_id(
        &self,
        post_id: PostId,
        page: Page,
    ) -> StorageResult<Vec<Comment>>;

    /// Register a live subscriber for comments added to `post_id`.
    async fn subscribe_to_comments(&self, post_id: PostId) -> StorageResult<CommentSubscription>;

    /// Release backend resources held for a subscription.
    async fn unsubscribe(&self, handle: &SubscriptionHandle) {
        handle.cancel();
    }
}
