//! Storage construction from configuration.
//!
//! The backend is built once at startup and handed to the API layer as
//! `Arc<dyn BaseStorage>`; nothing reaches it through global state.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::{Config, StorageKind};
use crate::kernel::{BaseStorage, MemoryStore, PostgresStore};

/// Build the backend selected by `config`. The postgres backend is migrated
/// before it is returned.
pub async fn build_storage(config: &Config) -> Result<Arc<dyn BaseStorage>> {
    match config.storage {
        StorageKind::InMemory => {
            tracing::info!("Using in-memory storage");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageKind::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;

            tracing::info!("Connecting to database...");
            let store = PostgresStore::connect(database_url, config.database_max_connections)
                .await
                .context("Failed to connect to database")?
                .with_keepalive_interval(config.listener_keepalive);

            store
                .run_migrations()
                .await
                .context("Failed to run migrations")?;

            Ok(Arc::new(store))
        }
    }
}
