//! # Entity Cache
//!
//! Best-effort facade over the `entity_cache` table. Reads fall back to an
//! empty result and writes are dropped when the local store fails; the
//! failure is logged and never reaches the caller, so a broken disk degrades
//! offline support instead of breaking online use.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::client::local_db::LocalDatabase;
use crate::shared::entity::{CachedEntity, EntityKey, EntityType};
use crate::shared::poll::Poll;

#[derive(Debug, Clone)]
pub struct EntityCache {
    db: Arc<LocalDatabase>,
}

impl EntityCache {
    pub fn new(db: Arc<LocalDatabase>) -> Self {
        Self { db }
    }

    /// Cached entities of a trip, most recently created first
    pub async fn get_cached_entities(
        &self,
        trip_id: &str,
        entity_type: EntityType,
    ) -> Vec<CachedEntity> {
        match self.db.get_entities(trip_id, entity_type).await {
            Ok(entities) => {
                tracing::debug!(trip_id, %entity_type, count = entities.len(), "Cache read");
                entities
            }
            Err(e) => {
                tracing::warn!(trip_id, %entity_type, error = %e, "Failed to read entity cache");
                Vec::new()
            }
        }
    }

    pub async fn get_cached_entity(&self, key: &EntityKey) -> Option<CachedEntity> {
        match self.db.get_entity(key).await {
            Ok(entity) => entity,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to read cached entity");
                None
            }
        }
    }

    /// Decoded cached entities; rows that no longer decode are skipped
    pub async fn cached<T: DeserializeOwned>(&self, trip_id: &str, entity_type: EntityType) -> Vec<T> {
        self.get_cached_entities(trip_id, entity_type)
            .await
            .into_iter()
            .filter_map(|entity| match entity.decode::<T>() {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(key = %entity.key, error = %e, "Skipping undecodable cache row");
                    None
                }
            })
            .collect()
    }

    /// Upsert the cached representation of an entity
    pub async fn cache_entity<T: Serialize>(
        &self,
        trip_id: &str,
        entity_type: EntityType,
        entity_id: &str,
        data: &T,
        version: Option<i64>,
    ) {
        let key = EntityKey::new(trip_id, entity_type, entity_id);
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to encode entity for cache");
                return;
            }
        };

        match self.db.upsert_entity(&key, &data, version).await {
            Ok(()) => tracing::debug!(key = %key, ?version, "Cache write"),
            Err(e) => tracing::warn!(key = %key, error = %e, "Failed to write entity cache"),
        }
    }

    pub async fn cache_poll(&self, poll: &Poll) {
        self.cache_entity(&poll.trip_id, EntityType::Poll, &poll.id, poll, Some(poll.version))
            .await;
    }

    pub async fn remove_entity(&self, key: &EntityKey) {
        if let Err(e) = self.db.delete_entity(key).await {
            tracing::warn!(key = %key, error = %e, "Failed to remove cached entity");
        }
    }
}
