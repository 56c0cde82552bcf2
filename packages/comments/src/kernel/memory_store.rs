//! Transient in-process storage backend.
//!
//! Posts, comments and the subscriber registry live behind a single
//! reader/writer lock owned by the store instance. Writers (`add_post`,
//! `add_comment`, `subscribe_to_comments`) take it exclusively, readers share it.
//!
//! Live delivery is best-effort: each subscriber owns a single-slot channel and
//! every new comment is offered with a non-blocking send. A subscriber whose slot
//! is still full (or whose receiver is gone) is pruned from the registry, so a
//! stalled consumer is unsubscribed instead of slowing writers down.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{StorageError, StorageResult};
use super::traits::{BaseStorage, CommentSubscription, SubscriptionHandle, SUBSCRIBER_CAPACITY};
use crate::common::{CommentId, Page, PostId, SubscriptionId};
use crate::domains::posts::{check_content_length, Comment, Post};

struct Subscriber {
    id: SubscriptionId,
    sender: mpsc::Sender<Comment>,
}

#[derive(Default)]
struct MemoryState {
    /// Keyed by time-ordered ids, so iteration is creation order.
    posts: BTreeMap<PostId, Post>,
    /// Per-post comments in insertion order.
    comments: HashMap<PostId, Vec<Comment>>,
    subscribers: HashMap<PostId, Vec<Subscriber>>,
}

/// In-memory implementation of [`BaseStorage`].
///
/// Cloneable; clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    /// Serializes fan-out bursts so subscribers see comments in commit order.
    fanout: Arc<Mutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscribers registered for a post.
    pub async fn subscriber_count(&self, post_id: PostId) -> usize {
        self.state
            .read()
            .await
            .subscribers
            .get(&post_id)
            .map_or(0, Vec::len)
    }

    /// Offer `comment` to each target without blocking, then prune the ones
    /// that could not take it.
    async fn fan_out(
        state: Arc<RwLock<MemoryState>>,
        comment: Comment,
        targets: Vec<(SubscriptionId, mpsc::Sender<Comment>)>,
        permit: OwnedMutexGuard<()>,
    ) {
        let post_id = comment.post_id;
        let mut dead = Vec::new();

        for (id, sender) in targets {
            match sender.try_send(comment.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(post_id = %post_id, subscription_id = %id, "subscriber not keeping up, dropping");
                    dead.push(id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(post_id = %post_id, subscription_id = %id, "subscriber receiver gone");
                    dead.push(id);
                }
            }
        }

        // The state lock must not be awaited while holding the permit:
        // add_comment holds the state lock while queueing for the permit.
        // Nothing above may await while the permit is held.
        drop(permit);

        if dead.is_empty() {
            return;
        }

        let mut state = state.write().await;
        if let Some(subscribers) = state.subscribers.get_mut(&post_id) {
            subscribers.retain(|s| !dead.contains(&s.id));
            if subscribers.is_empty() {
                state.subscribers.remove(&post_id);
            }
        }
    }
}

#[async_trait]
impl BaseStorage for MemoryStore {
    async fn add_post(
        &self,
        title: &str,
        content: &str,
        allow_comments: bool,
    ) -> StorageResult<Post> {
        let post = Post::new(title, content, allow_comments);

        let mut state = self.state.write().await;
        state.posts.insert(post.id, post.clone());

        info!(post_id = %post.id, allow_comments, "post added");
        Ok(post)
    }

    async fn get_all_posts(&self) -> StorageResult<Vec<Post>> {
        let state = self.state.read().await;
        if state.posts.is_empty() {
            debug!("no posts found");
            return Err(StorageError::NoPosts);
        }
        Ok(state.posts.values().cloned().collect())
    }

    async fn get_post_by_id(&self, id: PostId) -> StorageResult<Post> {
        let state = self.state.read().await;
        state
            .posts
            .get(&id)
            .cloned()
            .ok_or(StorageError::PostNotFound)
    }

    async fn add_comment(
        &self,
        post_id: PostId,
        parent_id: Option<CommentId>,
        content: &str,
    ) -> StorageResult<Comment> {
        let (comment, targets, permit) = {
            let mut state = self.state.write().await;

            let allow_comments = state
                .posts
                .get(&post_id)
                .map(|p| p.allow_comments)
                .ok_or(StorageError::PostNotFound)?;
            if !allow_comments {
                return Err(StorageError::CommentsDisabled);
            }
            check_content_length(content)?;

            let thread = state.comments.get(&post_id);
            if let Some(parent_id) = parent_id {
                let parent_on_post = thread.is_some_and(|t| t.iter().any(|c| c.id == parent_id));
                if !parent_on_post {
                    return Err(StorageError::InvalidParent);
                }
            }

            // created_at never goes backwards within a post
            let now = Utc::now();
            let created_at = thread
                .and_then(|t| t.last())
                .map_or(now, |last| last.created_at.max(now));

            let comment = Comment::new(post_id, parent_id, content, created_at);
            state
                .comments
                .entry(post_id)
                .or_default()
                .push(comment.clone());

            let targets: Vec<_> = state
                .subscribers
                .get(&post_id)
                .map(|subs| subs.iter().map(|s| (s.id, s.sender.clone())).collect())
                .unwrap_or_default();

            // Queue for the fan-out permit before releasing the write lock so
            // bursts run in the same order the comments were appended.
            let permit = if targets.is_empty() {
                None
            } else {
                Some(self.fanout.clone().lock_owned().await)
            };

            (comment, targets, permit)
        };

        info!(post_id = %post_id, comment_id = %comment.id, "comment added");

        if let Some(permit) = permit {
            debug!(post_id = %post_id, subscribers = targets.len(), "notifying subscribers");
            tokio::spawn(Self::fan_out(
                self.state.clone(),
                comment.clone(),
                targets,
                permit,
            ));
        }

        Ok(comment)
    }

    async fn get_comments_by_post_id(
        &self,
        post_id: PostId,
        page: Page,
    ) -> StorageResult<Vec<Comment>> {
        let state = self.state.read().await;

        if !state.posts.contains_key(&post_id) {
            return Err(StorageError::PostNotFound);
        }

        let comments = match state.comments.get(&post_id) {
            Some(comments) if !comments.is_empty() => comments,
            _ => {
                debug!(post_id = %post_id, "no comments found for post");
                return Err(StorageError::NoComments);
            }
        };

        Ok(page.apply(comments.iter().rev().cloned()))
    }

    async fn subscribe_to_comments(&self, post_id: PostId) -> StorageResult<CommentSubscription> {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let handle = SubscriptionHandle::new(post_id, CancellationToken::new());

        let mut state = self.state.write().await;
        state.subscribers.entry(post_id).or_default().push(Subscriber {
            id: handle.id,
            sender,
        });

        info!(post_id = %post_id, subscription_id = %handle.id, "subscribed to comments");
        Ok(CommentSubscription { handle, receiver })
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) {
        handle.cancel();

        let mut state = self.state.write().await;
        if let Some(subscribers) = state.subscribers.get_mut(&handle.post_id) {
            subscribers.retain(|s| s.id != handle.id);
            if subscribers.is_empty() {
                state.subscribers.remove(&handle.post_id);
            }
        }

        debug!(post_id = %handle.post_id, subscription_id = %handle.id, "unsubscribed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::posts::MAX_COMMENT_LENGTH;
    use std::time::Duration;

    const RECV_TIMEOUT: Duration = Duration::from_secs(1);

    async fn wait_for_subscriber_count(store: &MemoryStore, post_id: PostId, expected: usize) {
        tokio::time::timeout(RECV_TIMEOUT, async {
            while store.subscriber_count(post_id).await != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscriber count did not settle");
    }

    #[tokio::test]
    async fn test_get_all_posts_empty_is_not_found() {
        let store = MemoryStore::new();

        let err = store.get_all_posts().await.unwrap_err();
        assert!(matches!(err, StorageError::NoPosts));
        assert!(err.is_not_found());

        store.add_post("Post 1", "Content", true).await.unwrap();
        let posts = store.get_all_posts().await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "Post 1");
    }

    #[tokio::test]
    async fn test_get_all_posts_in_creation_order() {
        let store = MemoryStore::new();
        let first = store.add_post("first", "", true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = store.add_post("second", "", true).await.unwrap();

        let posts = store.get_all_posts().await.unwrap();
        assert_eq!(posts, vec![first, second]);
    }

    #[tokio::test]
    async fn test_get_post_by_id_roundtrip() {
        let store = MemoryStore::new();
        let post = store.add_post("A", "body", false).await.unwrap();

        let fetched = store.get_post_by_id(post.id).await.unwrap();
        assert_eq!(fetched, post);

        let err = store.get_post_by_id(PostId::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::PostNotFound));
    }

    #[tokio::test]
    async fn test_add_comment_and_list() {
        let store = MemoryStore::new();
        let post = store.add_post("A", "body", true).await.unwrap();

        store.add_comment(post.id, None, "hi").await.unwrap();

        let comments = store
            .get_comments_by_post_id(post.id, Page::new(10, 0))
            .await
            .unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].content, "hi");
        assert_eq!(comments[0].post_id, post.id);
        assert!(comments[0].parent_id.is_none());
    }

    #[tokio::test]
    async fn test_add_comment_to_missing_post() {
        let store = MemoryStore::new();
        let err = store
            .add_comment(PostId::new(), None, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::PostNotFound));
    }

    #[tokio::test]
    async fn test_comments_disabled_persists_nothing() {
        let store = MemoryStore::new();
        let post = store.add_post("A", "body", false).await.unwrap();

        let err = store.add_comment(post.id, None, "hi").await.unwrap_err();
        assert!(matches!(err, StorageError::CommentsDisabled));

        let err = store
            .get_comments_by_post_id(post.id, Page::new(10, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NoComments));
    }

    #[tokio::test]
    async fn test_content_length_boundary() {
        let store = MemoryStore::new();
        let post = store.add_post("A", "body", true).await.unwrap();

        let too_long = "x".repeat(MAX_COMMENT_LENGTH + 1);
        let err = store.add_comment(post.id, None, &too_long).await.unwrap_err();
        assert!(matches!(err, StorageError::ContentTooLong { .. }));

        let exact = "x".repeat(MAX_COMMENT_LENGTH);
        let comment = store.add_comment(post.id, None, &exact).await.unwrap();
        assert_eq!(comment.content.len(), MAX_COMMENT_LENGTH);
    }

    #[tokio::test]
    async fn test_parent_must_belong_to_same_post() {
        let store = MemoryStore::new();
        let post = store.add_post("A", "", true).await.unwrap();
        let other = store.add_post("B", "", true).await.unwrap();

        let root = store.add_comment(post.id, None, "root").await.unwrap();
        let reply = store
            .add_comment(post.id, Some(root.id), "reply")
            .await
            .unwrap();
        assert_eq!(reply.parent_id, Some(root.id));

        let err = store
            .add_comment(other.id, Some(root.id), "cross-post")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidParent));

        let err = store
            .add_comment(post.id, Some(CommentId::new()), "orphan")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidParent));
    }

    #[tokio::test]
    async fn test_comments_newest_first_with_pagination() {
        let store = MemoryStore::new();
        let post = store.add_post("A", "", true).await.unwrap();

        for i in 0..5 {
            store
                .add_comment(post.id, None, &format!("comment {i}"))
                .await
                .unwrap();
        }

        let all = store
            .get_comments_by_post_id(post.id, Page::new(5, 0))
            .await
            .unwrap();
        let contents: Vec<_> = all.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["comment 4", "comment 3", "comment 2", "comment 1", "comment 0"]
        );
        assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let window = store
            .get_comments_by_post_id(post.id, Page::new(2, 1))
            .await
            .unwrap();
        let contents: Vec<_> = window.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["comment 3", "comment 2"]);

        let past_end = store
            .get_comments_by_post_id(post.id, Page::new(10, 50))
            .await
            .unwrap();
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn test_subscriber_receives_comment() {
        let store = MemoryStore::new();
        let post = store.add_post("A", "", true).await.unwrap();

        let mut sub = store.subscribe_to_comments(post.id).await.unwrap();
        assert_eq!(store.subscriber_count(post.id).await, 1);

        let added = store.add_comment(post.id, None, "live").await.unwrap();

        let received = tokio::time::timeout(RECV_TIMEOUT, sub.next_comment())
            .await
            .expect("timed out waiting for comment")
            .unwrap();
        assert_eq!(received, added);
    }

    #[tokio::test]
    async fn test_subscriber_sees_comments_in_commit_order() {
        let store = MemoryStore::new();
        let post = store.add_post("A", "", true).await.unwrap();
        let mut sub = store.subscribe_to_comments(post.id).await.unwrap();

        for i in 0..3 {
            store
                .add_comment(post.id, None, &format!("c{i}"))
                .await
                .unwrap();
            let received = tokio::time::timeout(RECV_TIMEOUT, sub.next_comment())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(received.content, format!("c{i}"));
        }
    }

    #[tokio::test]
    async fn test_subscription_is_scoped_to_post() {
        let store = MemoryStore::new();
        let watched = store.add_post("watched", "", true).await.unwrap();
        let other = store.add_post("other", "", true).await.unwrap();

        let mut sub = store.subscribe_to_comments(watched.id).await.unwrap();
        store.add_comment(other.id, None, "elsewhere").await.unwrap();
        store.add_comment(watched.id, None, "here").await.unwrap();

        let received = tokio::time::timeout(RECV_TIMEOUT, sub.next_comment())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.content, "here");
    }

    #[tokio::test]
    async fn test_stalled_subscriber_is_dropped_without_blocking_writers() {
        let store = MemoryStore::new();
        let post = store.add_post("A", "", true).await.unwrap();

        // Never drained
        let mut stalled = store.subscribe_to_comments(post.id).await.unwrap();

        for i in 0..5 {
            tokio::time::timeout(
                RECV_TIMEOUT,
                store.add_comment(post.id, None, &format!("c{i}")),
            )
            .await
            .expect("writer blocked on a stalled subscriber")
            .unwrap();
        }

        wait_for_subscriber_count(&store, post.id, 0).await;

        // The buffered comment is still readable, then the stream ends.
        assert_eq!(stalled.next_comment().await.unwrap().content, "c0");
        assert!(matches!(
            stalled.next_comment().await,
            Err(StorageError::SubscriptionClosed)
        ));
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let store = MemoryStore::new();
        let post = store.add_post("A", "", true).await.unwrap();

        let sub = store.subscribe_to_comments(post.id).await.unwrap();
        drop(sub);

        store.add_comment(post.id, None, "nobody listening").await.unwrap();
        wait_for_subscriber_count(&store, post.id, 0).await;
    }

    #[tokio::test]
    async fn test_unsubscribe_shrinks_registry() {
        let store = MemoryStore::new();
        let post = store.add_post("A", "", true).await.unwrap();

        let first = store.subscribe_to_comments(post.id).await.unwrap();
        let _second = store.subscribe_to_comments(post.id).await.unwrap();
        assert_eq!(store.subscriber_count(post.id).await, 2);

        store.unsubscribe(&first.handle).await;
        assert_eq!(store.subscriber_count(post.id).await, 1);
        assert!(first.handle.is_cancelled());
    }
}
