//! Entity keys and cached entity records
//!
//! Every collaborative entity is addressed by the triple
//! `(trip_id, entity_type, entity_id)`. The same key is used by the local
//! cache, the in-memory query store and the offline queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::shared::error::SharedError;

/// Kind of collaborative entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A votable poll
    Poll,
    /// The shared basecamp location of a trip
    Basecamp,
}

impl EntityType {
    /// Tag stored in the cache table
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Poll => "poll",
            EntityType::Basecamp => "basecamp",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poll" => Ok(EntityType::Poll),
            "basecamp" => Ok(EntityType::Basecamp),
            other => Err(SharedError::validation(
                "entity_type",
                format!("unknown entity type '{}'", other),
            )),
        }
    }
}

/// Composite key of a collaborative entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub trip_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
}

impl EntityKey {
    pub fn new(
        trip_id: impl Into<String>,
        entity_type: EntityType,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            trip_id: trip_id.into(),
            entity_type,
            entity_id: entity_id.into(),
        }
    }

    /// Key of a poll
    pub fn poll(trip_id: impl Into<String>, poll_id: impl Into<String>) -> Self {
        Self::new(trip_id, EntityType::Poll, poll_id)
    }

    /// Key of a trip's basecamp; a trip has exactly one
    pub fn basecamp(trip_id: impl Into<String>) -> Self {
        let trip_id = trip_id.into();
        Self::new(trip_id.clone(), EntityType::Basecamp, trip_id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.trip_id, self.entity_type, self.entity_id)
    }
}

/// Last-known representation of an entity stored on the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntity {
    pub key: EntityKey,
    /// Entity payload as JSON
    pub data: serde_json::Value,
    /// Optimistic-lock version, when the entity carries one
    pub version: Option<i64>,
    pub cached_at: DateTime<Utc>,
}

impl CachedEntity {
    /// Decode the payload into a typed entity
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, SharedError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}
