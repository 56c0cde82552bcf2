//! Test harness with testcontainers for integration testing.
//!
//! One Postgres container is shared by every test in the binary. Each harness
//! gets its own freshly migrated database on that container, so tests that
//! depend on an empty store stay isolated.

use anyhow::{Context, Result};
use comments_core::kernel::PostgresStore;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use std::time::Duration;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Shared test infrastructure that persists across all tests.
struct SharedTestInfra {
    /// Server URL without a database name
    server_url: String,
    admin_pool: PgPool,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

/// Global shared infrastructure - initialized once, reused by all tests.
static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        // Run tests with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .with_tag("16")
            .with_cmd(["-c", "max_connections=200"])
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let server_url = format!("postgresql://postgres:postgres@{}:{}", pg_host, pg_port);

        let admin_pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&format!("{}/postgres", server_url))
            .await
            .context("Failed to connect to Postgres")?;

        Ok(Self {
            server_url,
            admin_pool,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// Test harness owning one isolated, migrated database.
///
/// # Example using test-context
///
/// ```ignore
/// use test_context::test_context;
///
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &mut TestHarness) {
///     let post = ctx.store.add_post("A", "", true).await.unwrap();
/// }
/// ```
pub struct TestHarness {
    pub store: PostgresStore,
    pub db_pool: PgPool,
    pub database_url: String,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new()
            .await
            .expect("Failed to create test harness")
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}

impl TestHarness {
    /// Create a fresh database on the shared container and migrate it.
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;

        let db_name = format!("test_{}", Uuid::new_v4().simple());
        infra
            .admin_pool
            .execute(format!(r#"CREATE DATABASE "{}""#, db_name).as_str())
            .await
            .context("Failed to create test database")?;

        let database_url = format!("{}/{}", infra.server_url, db_name);
        let store = PostgresStore::connect(&database_url, 10)
            .await
            .context("Failed to connect to test database")?;
        store
            .run_migrations()
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            db_pool: store.pool().clone(),
            store,
            database_url,
        })
    }

    /// A second, independently pooled store on the same database, standing in
    /// for another process.
    pub async fn second_store(&self) -> Result<PostgresStore> {
        PostgresStore::connect(&self.database_url, 5)
            .await
            .context("Failed to open second store")
    }

    /// Number of connections currently parked in LISTEN.
    pub async fn listening_connections(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM pg_stat_activity
             WHERE datname = current_database() AND query ILIKE 'LISTEN%'",
        )
        .fetch_one(&self.db_pool)
        .await?;
        Ok(count)
    }

    /// Kill every other backend connected to this database, listeners included.
    pub async fn terminate_other_connections(&self) -> Result<()> {
        sqlx::query(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity
             WHERE datname = current_database() AND pid <> pg_backend_pid()",
        )
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    /// Poll until `listening_connections` reaches `expected`.
    pub async fn wait_for_listeners(&self, expected: i64) -> Result<()> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if self.listening_connections().await? == expected {
                    return Ok::<_, anyhow::Error>(());
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .context("Timed out waiting for listener count")?
    }
}
