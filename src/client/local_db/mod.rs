//! # Local Database Module
//!
//! On-device SQLite storage backing the offline layer. It holds two things:
//!
//! - **Entity cache**: the last-known JSON representation of each
//!   collaborative entity, keyed by `(trip_id, entity_type, entity_id)`
//! - **Offline queue**: mutations recorded while offline, in FIFO order
//!
//! ## Key Components
//!
//! - `LocalDatabase`: connection pool, schema and migrations
//! - `schema.rs`: table definitions and migration versions
//! - `entities.rs`: entity cache rows
//! - `sync.rs`: offline queue rows and sync metadata
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tripsync::client::local_db::LocalDatabase;
//!
//! # async fn example() -> tripsync::client::local_db::Result<()> {
//! let db = LocalDatabase::open("/tmp/tripsync.db").await?;
//! let stats = db.get_stats().await?;
//! println!("{} cached entities", stats.cached_entities);
//! # Ok(())
//! # }
//! ```

pub mod entities;
pub mod schema;
pub mod sync;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by the local store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Filesystem error while preparing the database location
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row holds a value this version cannot interpret
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Result type for local database operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Local database connection manager
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
}

impl LocalDatabase {
    /// Open or create the database file at `path`
    ///
    /// Uses WAL mode so background replay and foreground writes do not
    /// block each other.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        tracing::debug!(path = %path.display(), "Opened local database");
        Ok(db)
    }

    /// Create an in-memory database
    ///
    /// A single connection is used so every query sees the same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Create all tables and apply pending migrations
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        self.run_migrations().await
    }

    /// Check the current schema version and apply pending migrations
    async fn run_migrations(&self) -> Result<()> {
        let current_version: i32 =
            sqlx::query("SELECT COALESCE(MAX(version), 0) AS version FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?
                .try_get("version")?;

        if !schema::needs_migration(current_version) {
            return Ok(());
        }

        for version in schema::get_pending_migrations(current_version) {
            let statements = match version {
                1 => schema::SCHEMA_V1,
                other => {
                    return Err(StoreError::Corrupt(format!(
                        "no migration registered for schema version {}",
                        other
                    )))
                }
            };

            let mut tx = self.pool.begin().await?;
            for statement in statements {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            tracing::info!(version, "Applied local schema migration");
        }
        Ok(())
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get database statistics
    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let cached_entities: i64 = sqlx::query("SELECT COUNT(*) AS n FROM entity_cache")
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;

        let queued_operations: i64 = sqlx::query("SELECT COUNT(*) AS n FROM offline_queue")
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;

        Ok(DatabaseStats {
            cached_entities: cached_entities as u64,
            queued_operations: queued_operations as u64,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Rows in the entity cache
    pub cached_entities: u64,
    /// Rows in the offline queue, any status
    pub queued_operations: u64,
}
