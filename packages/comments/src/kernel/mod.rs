//! Kernel module - storage backends and the live comment feed.

pub mod deps;
pub mod error;
pub mod memory_store;
pub mod notification;
pub mod postgres_store;
pub mod subscription;
pub mod traits;

pub use deps::build_storage;
pub use error::{StorageError, StorageResult};
pub use memory_store::MemoryStore;
pub use notification::{CommentNotification, COMMENTS_CHANNEL};
pub use postgres_store::{PostgresStore, DEFAULT_KEEPALIVE_INTERVAL};
pub use subscription::{bridge, subscribe_comments};
pub use traits::*;
