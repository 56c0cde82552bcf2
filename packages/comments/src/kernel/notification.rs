//! Wire payload exchanged over PostgreSQL LISTEN/NOTIFY.
//!
//! The writer publishes `{"post_id": .., "comment_id": ..}` on
//! [`COMMENTS_CHANNEL`] in the same transaction as the insert. Listeners filter
//! by `post_id` and load the comment row by id, which keeps payloads far below
//! the 8000-byte NOTIFY limit whatever the comment size.

use serde::{Deserialize, Serialize};

use crate::common::{CommentId, PostId};

/// Channel every durable store instance publishes and listens on.
pub const COMMENTS_CHANNEL: &str = "comments_channel";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentNotification {
    pub post_id: PostId,
    pub comment_id: CommentId,
}

impl CommentNotification {
    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_payload(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}
