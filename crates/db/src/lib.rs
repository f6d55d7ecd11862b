//! Durable job store.
//!
//! [`JobStore`] is the single owner of canonical [`Job`](omnidocs_core::job::Job)
//! records. Three backends implement it:
//!
//! - [`FileJobStore`]: one JSON document rewritten atomically on each write.
//! - [`PgJobStore`]: one row per job in the `conversion_jobs` table.
//! - [`MemoryJobStore`]: process-local, for tests and embedding.

pub mod file;
pub mod memory;
pub mod postgres;
pub mod store;

pub use file::FileJobStore;
pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;
pub use store::{check_overwrite, JobStore, StoreError};

use sqlx::postgres::PgPoolOptions;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run a trivial query to verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations in `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
