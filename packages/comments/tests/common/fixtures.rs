//! Test fixtures for creating test data.

use anyhow::Result;
use comments_core::domains::posts::Post;
use comments_core::kernel::BaseStorage;

/// Create a post that accepts comments
pub async fn create_open_post(storage: &dyn BaseStorage, title: &str) -> Result<Post> {
    Ok(storage.add_post(title, "Test content", true).await?)
}

/// Create a post with comments disabled
pub async fn create_locked_post(storage: &dyn BaseStorage, title: &str) -> Result<Post> {
    Ok(storage.add_post(title, "Test content", false).await?)
}
