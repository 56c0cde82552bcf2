use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::{CommentId, Page, PostId};
use crate::kernel::StorageError;

/// Upper bound on comment content, in characters. Mirrored by the
/// `comments_content_length` check constraint.
pub const MAX_COMMENT_LENGTH: usize = 2000;

/// Comment - a reply to a post, optionally threaded under another comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    /// Parent comment on the same post (None for top-level comments)
    pub parent_id: Option<CommentId>,
    pub content: String,
    /// Assigned by the store at insert time; the ordering key.
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(
        post_id: PostId,
        parent_id: Option<CommentId>,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CommentId::new(),
            post_id,
            parent_id,
            content: content.into(),
            created_at,
        }
    }
}

/// Reject content longer than [`MAX_COMMENT_LENGTH`]. Never truncates.
pub fn check_content_length(content: &str) -> Result<(), StorageError> {
    let length = content.chars().count();
    if length > MAX_COMMENT_LENGTH {
        return Err(StorageError::ContentTooLong {
            length,
            max: MAX_COMMENT_LENGTH,
        });
    }
    Ok(())
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

const COMMENT_COLUMNS: &str = "id, post_id, parent_id, content, created_at";

impl Comment {
    /// Insert a comment inside an open transaction.
    ///
    /// `created_at` is the statement's wall clock, never earlier than the
    /// newest comment already on the post. Callers hold the post row lock
    /// (see `Post::find_allow_comments`), so insert order is commit order.
    pub async fn create(
        post_id: PostId,
        parent_id: Option<CommentId>,
        content: &str,
        conn: &mut sqlx::PgConnection,
    ) -> sqlx::Result<Self> {
        sqlx::query_as::<_, Comment>(&format!(
            r#"
            INSERT INTO comments (id, post_id, parent_id, content, created_at)
            VALUES (
                $1, $2, $3, $4,
                GREATEST(
                    clock_timestamp(),
                    (SELECT MAX(created_at) FROM comments WHERE post_id = $2)
                )
            )
            RETURNING {COMMENT_COLUMNS}
            "#
        ))
        .bind(CommentId::new())
        .bind(post_id)
        .bind(parent_id)
        .bind(content)
        .fetch_one(conn)
        .await
    }

    /// Owning post of a comment, used to validate parent references
    pub async fn find_post_id(
        id: CommentId,
        conn: &mut sqlx::PgConnection,
    ) -> sqlx::Result<Option<PostId>> {
        sqlx::query_scalar::<_, PostId>("SELECT post_id FROM comments WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Find comment by ID
    pub async fn find_by_id(id: CommentId, pool: &PgPool) -> sqlx::Result<Option<Self>> {
        sqlx::query_as::<_, Comment>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Whether the post has at least one comment
    pub async fn exists_for_post(post_id: PostId, pool: &PgPool) -> sqlx::Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM comments WHERE post_id = $1)",
        )
        .bind(post_id)
        .fetch_one(pool)
        .await
    }

    /// Newest-first page of a post's comments; `seq` breaks created_at ties
    pub async fn find_page_for_post(
        post_id: PostId,
        page: Page,
        pool: &PgPool,
    ) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as::<_, Comment>(&format!(
            r#"
            SELECT {COMMENT_COLUMNS}
            FROM comments
            WHERE post_id = $1
            ORDER BY created_at DESC, seq DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(post_id)
        .bind(page.sql_limit())
        .bind(page.sql_offset())
        .fetch_all(pool)
        .await
    }
}
