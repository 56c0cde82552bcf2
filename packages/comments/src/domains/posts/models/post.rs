use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::PostId;

/// Post - the root content unit that comments attach to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub content: String,
    /// Fixed at creation; gates every comment write.
    pub allow_comments: bool,
}

impl Post {
    /// Build a new post with a freshly generated id.
    pub fn new(title: impl Into<String>, content: impl Into<String>, allow_comments: bool) -> Self {
        Self {
            id: PostId::new(),
            title: title.into(),
            content: content.into(),
            allow_comments,
        }
    }
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl Post {
    /// Insert a new post (returns the stored row)
    pub async fn create(
        title: &str,
        content: &str,
        allow_comments: bool,
        pool: &PgPool,
    ) -> sqlx::Result<Self> {
        sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (id, title, content, allow_comments)
            VALUES ($1, $2, $3, $4)
            RETURNING id, title, content, allow_comments
            "#,
        )
        .bind(PostId::new())
        .bind(title)
        .bind(content)
        .bind(allow_comments)
        .fetch_one(pool)
        .await
    }

    /// All posts in creation order (ids are time-ordered)
    pub async fn find_all(pool: &PgPool) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as::<_, Post>(
            "SELECT id, title, content, allow_comments FROM posts ORDER BY id",
        )
        .fetch_all(pool)
        .await
    }

    /// Find post by ID
    pub async fn find_by_id(id: PostId, pool: &PgPool) -> sqlx::Result<Option<Self>> {
        sqlx::query_as::<_, Post>(
            "SELECT id, title, content, allow_comments FROM posts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Look up the comment gate for a post inside an open transaction
    pub async fn find_allow_comments(
        id: PostId,
        conn: &mut sqlx::PgConnection,
    ) -> sqlx::Result<Option<bool>> {
        // Row lock serializes comment writers on the same post until commit
        sqlx::query_scalar::<_, bool>("SELECT allow_comments FROM posts WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await
    }
}
