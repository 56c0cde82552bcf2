//! CLI for the posts/comments schema
//!
//! Applies or inspects the SQL migrations used by the PostgreSQL backend.
//! Outputs one JSON object per line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comments_core::config::Config;
use comments_core::kernel::PostgresStore;
use serde::Serialize;
use sqlx::migrate::Migrate;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "migrate_cli")]
#[command(about = "Schema migration CLI for the PostgreSQL comment store")]
struct Cli {
    /// Overrides DATABASE_URL
    #[arg(long)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all pending migrations
    Run,

    /// List known migrations and whether each is applied
    Info,
}

// ============================================================================
// JSON Response Types
// ============================================================================

#[derive(Serialize)]
struct Response {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    migrations: Option<Vec<MigrationInfo>>,
}

#[derive(Serialize)]
struct MigrationInfo {
    version: i64,
    description: String,
    applied: bool,
}

fn output(resp: &Response) -> Result<()> {
    println!("{}", serde_json::to_string(resp)?);
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,comments_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let database_url = match cli.database_url {
        Some(url) => url,
        None => Config::from_env()
            .context("Failed to load configuration")?
            .database_url
            .context("DATABASE_URL must be set")?,
    };

    let store = PostgresStore::connect(&database_url, 1)
        .await
        .context("Failed to connect to database")?;

    match cli.command {
        Commands::Run => {
            let result = store.run_migrations().await;
            let resp = match &result {
                Ok(()) => Response {
                    success: true,
                    message: Some("migrations applied".to_string()),
                    migrations: None,
                },
                Err(e) => Response {
                    success: false,
                    message: Some(e.to_string()),
                    migrations: None,
                },
            };
            output(&resp)?;
            result.context("Failed to run migrations")?;
        }
        Commands::Info => {
            let mut conn = store
                .pool()
                .acquire()
                .await
                .context("Failed to acquire connection")?;
            conn.ensure_migrations_table().await?;
            let applied = conn.list_applied_migrations().await?;

            let migrations = sqlx::migrate!("./migrations")
                .iter()
                .map(|m| MigrationInfo {
                    version: m.version,
                    description: m.description.to_string(),
                    applied: applied.iter().any(|a| a.version == m.version),
                })
                .collect();

            output(&Response {
                success: true,
                message: None,
                migrations: Some(migrations),
            })?;
        }
    }

    Ok(())
}
