//! # Entity Cache Rows
//!
//! Upsert and lookup of cached entity payloads. Payloads are stored as JSON
//! text; ordering by the payload's `created_at` happens after decoding since
//! RFC 3339 strings with varying fractional precision do not sort
//! lexicographically.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{LocalDatabase, Result, StoreError};
use crate::shared::entity::{CachedEntity, EntityKey, EntityType};

impl LocalDatabase {
    /// Insert or overwrite the cached payload of one entity
    pub async fn upsert_entity(
        &self,
        key: &EntityKey,
        data: &serde_json::Value,
        version: Option<i64>,
    ) -> Result<()> {
        let data = serde_json::to_string(data)?;

        sqlx::query(
            "INSERT INTO entity_cache (trip_id, entity_type, entity_id, data, version, cached_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(trip_id, entity_type, entity_id) DO UPDATE SET
                data = excluded.data,
                version = excluded.version,
                cached_at = excluded.cached_at",
        )
        .bind(&key.trip_id)
        .bind(key.entity_type.as_str())
        .bind(&key.entity_id)
        .bind(data)
        .bind(version)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All cached entities of a trip and type, most recently created first
    pub async fn get_entities(
        &self,
        trip_id: &str,
        entity_type: EntityType,
    ) -> Result<Vec<CachedEntity>> {
        let rows = sqlx::query(
            "SELECT trip_id, entity_type, entity_id, data, version, cached_at
             FROM entity_cache
             WHERE trip_id = ? AND entity_type = ?",
        )
        .bind(trip_id)
        .bind(entity_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut entities = rows
            .iter()
            .map(row_to_entity)
            .collect::<Result<Vec<_>>>()?;

        entities.sort_by(|a, b| sort_time(b).cmp(&sort_time(a)));
        Ok(entities)
    }

    /// A single cached entity
    pub async fn get_entity(&self, key: &EntityKey) -> Result<Option<CachedEntity>> {
        let row = sqlx::query(
            "SELECT trip_id, entity_type, entity_id, data, version, cached_at
             FROM entity_cache
             WHERE trip_id = ? AND entity_type = ? AND entity_id = ?",
        )
        .bind(&key.trip_id)
        .bind(key.entity_type.as_str())
        .bind(&key.entity_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_entity).transpose()
    }

    /// Remove a cached entity; returns whether a row existed
    pub async fn delete_entity(&self, key: &EntityKey) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM entity_cache WHERE trip_id = ? AND entity_type = ? AND entity_id = ?",
        )
        .bind(&key.trip_id)
        .bind(key.entity_type.as_str())
        .bind(&key.entity_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_entity(row: &SqliteRow) -> Result<CachedEntity> {
    let entity_type: String = row.try_get("entity_type")?;
    let data: String = row.try_get("data")?;
    let cached_at: String = row.try_get("cached_at")?;

    Ok(CachedEntity {
        key: EntityKey {
            trip_id: row.try_get("trip_id")?,
            entity_type: entity_type
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("{}", e)))?,
            entity_id: row.try_get("entity_id")?,
        },
        data: serde_json::from_str(&data)?,
        version: row.try_get("version")?,
        cached_at: parse_timestamp(&cached_at)?,
    })
}

/// Creation time of the payload, falling back to the cache time
fn sort_time(entity: &CachedEntity) -> DateTime<Utc> {
    entity
        .data
        .get("created_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(entity.cached_at)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{}': {}", value, e)))
}
