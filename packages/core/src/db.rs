//! SQLite pool creation and schema migrations.
//!
//! Migrations run once, inside [`create_pool`], before the pool is handed to
//! anything else. A process that got a pool back has a ready schema; request
//! handlers never probe for tables.
//!
//! The schema lives in `migrations/*.sql` and is embedded at build time.
//! Applied versions and their checksums are tracked by sqlx in
//! `_sqlx_migrations`, so an edited migration fails startup.

use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Message raised by the overlap triggers. Matched by the repository to tell
/// an invariant violation apart from other database errors.
pub const OVERLAP_TRIGGER_MESSAGE: &str = "schedule_overlap";

/// How long a writer waits for another connection's write lock.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

static MIGRATOR: Migrator = sqlx::migrate!();

/// Open a pool for `database_url` and bring the schema up to date.
///
/// `sqlite::memory:` databases are per-connection, so they get a single
/// connection that is never recycled. File databases use WAL so readers do
/// not block the writer.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let in_memory = database_url.contains(":memory:");

    let mut options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let mut pool_options = SqlitePoolOptions::new();
    pool_options = if in_memory {
        pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        pool_options.max_connections(5)
    };

    let pool = pool_options.connect_with(options).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Apply every embedded migration not yet recorded as applied.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    MIGRATOR.run(pool).await?;
    tracing::debug!("Schema at version {}", latest_schema_version());
    Ok(())
}

/// Highest successfully applied migration version, `0` for a fresh database.
pub async fn schema_version(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?;
    Ok(version.unwrap_or(0))
}

/// Highest migration version this build knows about.
pub fn latest_schema_version() -> i64 {
    MIGRATOR
        .migrations
        .iter()
        .map(|migration| migration.version)
        .max()
        .unwrap_or(0)
}
