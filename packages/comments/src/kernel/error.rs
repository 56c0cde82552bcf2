use thiserror::Error;

/// Errors produced at the storage boundary.
///
/// Validation errors are never transient and are not retried.
/// `BackendUnavailable` wraps driver/connectivity failures.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("post not found")]
    PostNotFound,

    #[error("no comments found for this post")]
    NoComments,

    #[error("no posts found")]
    NoPosts,

    #[error("comments are disabled for this post")]
    CommentsDisabled,

    #[error("comment is too long: {length} characters (max {max})")]
    ContentTooLong { length: usize, max: usize },

    #[error("parent comment does not exist on this post")]
    InvalidParent,

    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(#[from] sqlx::Error),

    #[error("malformed notification payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("subscription closed")]
    SubscriptionClosed,
}

impl StorageError {
    /// Absence of a post, of any posts, or of any comments on a post.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::PostNotFound | StorageError::NoPosts | StorageError::NoComments
        )
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
