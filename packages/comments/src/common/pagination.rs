//! Offset pagination for comment listings.
//!
//! # Usage
//!
//! ```rust,ignore
//! // In GraphQL query resolver
//! let page = PageArgs { limit: Some(10), offset: None }.validate()?;
//!
//! // In storage
//! let comments = storage.get_comments_by_post_id(post_id, page).await?;
//! ```

use serde::{Deserialize, Serialize};

/// Limit applied when a caller omits one.
pub const DEFAULT_LIMIT: usize = 25;

/// Raw pagination input as it arrives from the API layer.
#[derive(Debug, Clone, Default)]
pub struct PageArgs {
    /// Maximum number of comments to return.
    pub limit: Option<i32>,
    /// Number of comments to skip, counting from the newest.
    pub offset: Option<i32>,
}

impl PageArgs {
    /// Validate raw arguments. Negative values are rejected, never clamped.
    pub fn validate(&self) -> Result<Page, &'static str> {
        let limit = match self.limit {
            Some(l) if l < 0 => return Err("limit must not be negative"),
            Some(l) => l as usize,
            None => DEFAULT_LIMIT,
        };
        let offset = match self.offset {
            Some(o) if o < 0 => return Err("offset must not be negative"),
            Some(o) => o as usize,
            None => 0,
        };

        Ok(Page { limit, offset })
    }
}

/// Validated offset/limit window over the newest-first comment ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// Apply the window to an already ordered sequence.
    ///
    /// An offset past the end yields an empty page, not an error.
    pub fn apply<I: IntoIterator>(&self, items: I) -> Vec<I::Item> {
        items
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect()
    }

    /// SQL `LIMIT` value.
    pub fn sql_limit(&self) -> i64 {
        i64::try_from(self.limit).unwrap_or(i64::MAX)
    }

    /// SQL `OFFSET` value.
    pub fn sql_offset(&self) -> i64 {
        i64::try_from(self.offset).unwrap_or(i64::MAX)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, 0)
    }
}
