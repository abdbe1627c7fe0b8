//! Database Schema Definitions
//!
//! Table definitions for the on-device store and the migration bookkeeping
//! used by `LocalDatabase::run_migrations`.

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Schema migration versions
pub const MIGRATION_VERSIONS: &[i32] = &[1];

/// Statements creating the version 1 schema
pub const SCHEMA_V1: &[&str] = &[
    // One row per (trip, type, id); writes overwrite in place
    "CREATE TABLE IF NOT EXISTS entity_cache (
        trip_id TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        data TEXT NOT NULL,
        version INTEGER,
        cached_at TEXT NOT NULL,
        PRIMARY KEY (trip_id, entity_type, entity_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_entity_cache_trip
        ON entity_cache(trip_id, entity_type)",
    // seq gives the FIFO replay order
    "CREATE TABLE IF NOT EXISTS offline_queue (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        kind TEXT NOT NULL,
        action TEXT NOT NULL,
        trip_id TEXT NOT NULL,
        target_id TEXT,
        payload TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        retry_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        last_attempt TEXT,
        error_message TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_offline_queue_status
        ON offline_queue(status, seq)",
    "CREATE TABLE IF NOT EXISTS sync_metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
];

/// Check if database needs migration
pub fn needs_migration(current_version: i32) -> bool {
    current_version < CURRENT_SCHEMA_VERSION
}

/// Get pending migrations
pub fn get_pending_migrations(current_version: i32) -> Vec<i32> {
    MIGRATION_VERSIONS
        .iter()
        .filter(|&&v| v > current_version)
        .cloned()
        .collect()
}
