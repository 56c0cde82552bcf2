pub mod data;
pub mod models;

// Re-export data types (GraphQL types)
pub use data::{CommentData, PostData};

// Re-export models (domain models)
pub use models::comment::{check_content_length, Comment, MAX_COMMENT_LENGTH};
pub use models::post::Post;
