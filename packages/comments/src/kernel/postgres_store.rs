//! Durable PostgreSQL storage backend.
//!
//! Writes go through the shared pool. Live comments are delivered through
//! LISTEN/NOTIFY, so subscribers in any process see comments written by any
//! other process:
//!
//! ```text
//! add_comment ──► BEGIN; INSERT comment; pg_notify(comments_channel, {post_id, comment_id}); COMMIT
//!                                              │
//! subscribe_to_comments ──► PgListener ◄───────┘
//!     │    (one dedicated connection per subscriber)
//!     ├─► keep-alive ping every interval (failure ends the stream)
//!     ├─► filter by post_id, load comment row by id
//!     └─► forward into the subscriber channel
//! ```
//!
//! Write paths do not reconnect on their own; a lost connection surfaces as
//! `BackendUnavailable` and recovery is left to the pool.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgListener, PgNotification, PgPoolOptions};
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{StorageError, StorageResult};
use super::notification::{CommentNotification, COMMENTS_CHANNEL};
use super::traits::{BaseStorage, CommentSubscription, SubscriptionHandle, SUBSCRIBER_CAPACITY};
use crate::common::{CommentId, Page, PostId};
use crate::domains::posts::{check_content_length, Comment, Post, MAX_COMMENT_LENGTH};

/// How often an idle listener pings its connection.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(90);

/// PostgreSQL implementation of [`BaseStorage`].
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    keepalive_interval: Duration,
}

impl PostgresStore {
    /// Wrap an existing pool. Listener connections use the pool's connect options.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!(max_connections, "connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Override the listener ping interval. A zero interval is ignored.
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            warn!("zero keepalive interval ignored, keeping {:?}", self.keepalive_interval);
            return self;
        }
        self.keepalive_interval = interval;
        self
    }

    /// Create or upgrade the posts/comments schema.
    pub async fn run_migrations(&self) -> StorageResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("database migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Forward matching notifications until cancelled, the subscriber goes
    /// away, or the connection fails. Dropping `listener` closes its connection
    /// and dropping `sender` ends the subscriber's stream.
    async fn run_listener(
        mut listener: PgListener,
        pool: PgPool,
        post_id: PostId,
        cancel: CancellationToken,
        sender: mpsc::Sender<Comment>,
        keepalive_interval: Duration,
    ) {
        let mut keepalive = tokio::time::interval(keepalive_interval);
        keepalive.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(post_id = %post_id, "listener cancelled");
                    break;
                }
                _ = keepalive.tick() => {
                    if let Err(e) = sqlx::query("SELECT 1").execute(&mut listener).await {
                        warn!(post_id = %post_id, error = %e, "listener ping failed");
                        break;
                    }
                }
                received = listener.try_recv() => {
                    let notification = match received {
                        Ok(Some(notification)) => notification,
                        Ok(None) => {
                            warn!(post_id = %post_id, "listener connection lost");
                            break;
                        }
                        Err(e) => {
                            warn!(post_id = %post_id, error = %e, "listener receive failed");
                            break;
                        }
                    };

                    let comment = match Self::resolve_notification(&notification, post_id, &pool).await {
                        Ok(Some(comment)) => comment,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!(post_id = %post_id, error = %e, "failed to load notified comment");
                            break;
                        }
                    };

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        sent = sender.send(comment) => {
                            if sent.is_err() {
                                debug!(post_id = %post_id, "subscriber receiver gone");
                                break;
                            }
                        }
                    }
                }
            }
        }

        debug!(post_id = %post_id, "listener stopped");
    }

    /// Load the comment a notification refers to, if it belongs to `post_id`.
    async fn resolve_notification(
        notification: &PgNotification,
        post_id: PostId,
        pool: &PgPool,
    ) -> StorageResult<Option<Comment>> {
        let parsed = match CommentNotification::from_payload(notification.payload()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "ignoring malformed comment notification");
                return Ok(None);
            }
        };

        if parsed.post_id != post_id {
            return Ok(None);
        }

        Ok(Comment::find_by_id(parsed.comment_id, pool).await?)
    }
}

/// A check violation on insert is the content bound enforced a second time
/// by the schema.
fn map_insert_error(err: sqlx::Error, content: &str) -> StorageError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_check_violation() {
            return StorageError::ContentTooLong {
                length: content.chars().count(),
                max: MAX_COMMENT_LENGTH,
            };
        }
    }
    err.into()
}

#[async_trait]
impl BaseStorage for PostgresStore {
    async fn add_post(
        &self,
        title: &str,
        content: &str,
        allow_comments: bool,
    ) -> StorageResult<Post> {
        let post = Post::create(title, content, allow_comments, &self.pool).await?;
        info!(post_id = %post.id, allow_comments, "post added");
        Ok(post)
    }

    async fn get_all_posts(&self) -> StorageResult<Vec<Post>> {
        let posts = Post::find_all(&self.pool).await?;
        if posts.is_empty() {
            debug!("no posts found");
            return Err(StorageError::NoPosts);
        }
        Ok(posts)
    }

    async fn get_post_by_id(&self, id: PostId) -> StorageResult<Post> {
        Post::find_by_id(id, &self.pool)
            .await?
            .ok_or(StorageError::PostNotFound)
    }

    async fn add_comment(
        &self,
        post_id: PostId,
        parent_id: Option<CommentId>,
        content: &str,
    ) -> StorageResult<Comment> {
        // Insert and notify commit together; an early return rolls back.
        let mut tx = self.pool.begin().await?;

        let allow_comments = Post::find_allow_comments(post_id, &mut *tx)
            .await?
            .ok_or(StorageError::PostNotFound)?;
        if !allow_comments {
            return Err(StorageError::CommentsDisabled);
        }
        check_content_length(content)?;

        if let Some(parent_id) = parent_id {
            match Comment::find_post_id(parent_id, &mut *tx).await? {
                Some(owner) if owner == post_id => {}
                _ => return Err(StorageError::InvalidParent),
            }
        }

        let comment = Comment::create(post_id, parent_id, content, &mut *tx)
            .await
            .map_err(|e| map_insert_error(e, content))?;

        let payload = CommentNotification {
            post_id,
            comment_id: comment.id,
        }
        .to_payload()?;

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(COMMENTS_CHANNEL)
            .bind(payload)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(post_id = %post_id, comment_id = %comment.id, "comment added");
        Ok(comment)
    }

    async fn get_comments_by_post_id(
        &self,
        post_id: PostId,
        page: Page,
    ) -> StorageResult<Vec<Comment>> {
        if !Comment::exists_for_post(post_id, &self.pool).await? {
            if Post::find_by_id(post_id, &self.pool).await?.is_none() {
                return Err(StorageError::PostNotFound);
            }
            debug!(post_id = %post_id, "no comments found for post");
            return Err(StorageError::NoComments);
        }

        Ok(Comment::find_page_for_post(post_id, page, &self.pool).await?)
    }

    async fn subscribe_to_comments(&self, post_id: PostId) -> StorageResult<CommentSubscription> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(COMMENTS_CHANNEL).await?;

        let (sender, receiver) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let handle = SubscriptionHandle::new(post_id, CancellationToken::new());

        tokio::spawn(Self::run_listener(
            listener,
            self.pool.clone(),
            post_id,
            handle.token().clone(),
            sender,
            self.keepalive_interval,
        ));

        info!(post_id = %post_id, subscription_id = %handle.id, "listening for comments");
        Ok(CommentSubscription { handle, receiver })
    }
}
