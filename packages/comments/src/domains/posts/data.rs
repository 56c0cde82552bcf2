use chrono::{DateTime, Utc};
use juniper::GraphQLObject;
use serde::{Deserialize, Serialize};

use crate::domains::posts::models::{Comment, Post};

/// Post GraphQL data type
///
/// Public API representation of a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, GraphQLObject)]
#[graphql(description = "A post that comments can be attached to")]
pub struct PostData {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Whether new comments are accepted
    pub allow_comments: bool,
}

impl From<Post> for PostData {
    fn from(post: Post) -> Self {
        Self {
            id: post.id.to_string(),
            title: post.title,
            content: post.content,
            allow_comments: post.allow_comments,
        }
    }
}

/// Comment GraphQL data type
///
/// Shape delivered to queries and to live `commentAdded` subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, GraphQLObject)]
#[graphql(description = "A comment on a post, optionally threaded under another comment")]
pub struct CommentData {
    pub id: String,
    pub post_id: String,
    /// Parent comment (null for top-level comments)
    pub parent_id: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<Comment> for CommentData {
    fn from(comment: Comment) -> Self {
        Self {
            id: comment.id.to_string(),
            post_id: comment.post_id.to_string(),
            parent_id: comment.parent_id.map(|id| id.to_string()),
            content: comment.content,
            created_at: comment.created_at,
        }
    }
}
