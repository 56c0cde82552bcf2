use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which storage backend to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    InMemory,
    Postgres,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "in-memory" | "memory" => Ok(StorageKind::InMemory),
            "postgres" => Ok(StorageKind::Postgres),
            other => bail!("unknown STORAGE_TYPE '{other}' (expected 'in-memory' or 'postgres')"),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageKind,
    /// Required for the postgres backend; also used for listener connections.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub listener_keepalive: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let storage = lookup("STORAGE_TYPE")
            .map(|s| s.parse())
            .transpose()
            .context("STORAGE_TYPE is invalid")?
            .unwrap_or(StorageKind::InMemory);

        let database_url = lookup("DATABASE_URL");
        if storage == StorageKind::Postgres && database_url.is_none() {
            bail!("DATABASE_URL must be set when STORAGE_TYPE=postgres");
        }

        Ok(Self {
            storage,
            database_url,
            database_max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid number")?,
            listener_keepalive: parse_keepalive(lookup("LISTENER_KEEPALIVE_SECS"))?,
        })
    }
}

fn parse_keepalive(value: Option<String>) -> Result<Duration> {
    let secs: u64 = value
        .unwrap_or_else(|| "90".to_string())
        .parse()
        .context("LISTENER_KEEPALIVE_SECS must be a valid number")?;
    if secs == 0 {
        bail!("LISTENER_KEEPALIVE_SECS must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}
