//! # Optimistic Updates
//!
//! In-memory query state plus the bookkeeping needed to undo or keep
//! optimistic changes.
//!
//! ## Features
//!
//! - **Query Store**: per-trip list of entities used for rendering, with
//!   invalidation
//! - **Rollback Support**: every update snapshots the value it replaced
//! - **Queued Updates**: updates backed by an offline operation are kept
//!   until replay confirms or abandons them
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tripsync::client::offline::{OptimisticManager, QueryStore};
//! use tripsync::shared::Poll;
//!
//! # async fn example(poll: Poll) {
//! let store = Arc::new(QueryStore::<Poll>::new());
//! let manager = OptimisticManager::new(store.clone());
//!
//! let update_id = manager.apply(&poll.trip_id, &poll.id, Some(poll.clone())).await;
//!
//! // Server rejected the change
//! manager.rollback(&update_id).await;
//! # }
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::shared::basecamp::Basecamp;
use crate::shared::poll::Poll;

/// Entities addressable by id inside a trip
pub trait Identified {
    fn entity_id(&self) -> &str;
}

impl Identified for Poll {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl Identified for Basecamp {
    fn entity_id(&self) -> &str {
        &self.trip_id
    }
}

#[derive(Debug, Clone)]
struct QueryEntry<T> {
    items: Vec<T>,
    fetched_at: DateTime<Utc>,
    stale: bool,
}

/// Per-trip query results
#[derive(Debug)]
pub struct QueryStore<T> {
    entries: RwLock<HashMap<String, QueryEntry<T>>>,
}

impl<T: Identified + Clone> QueryStore<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the whole list of a trip and mark it fresh
    pub async fn set_list(&self, trip_id: &str, items: Vec<T>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            trip_id.to_string(),
            QueryEntry {
                items,
                fetched_at: Utc::now(),
                stale: false,
            },
        );
    }

    pub async fn list(&self, trip_id: &str) -> Vec<T> {
        let entries = self.entries.read().await;
        entries
            .get(trip_id)
            .map(|entry| entry.items.clone())
            .unwrap_or_default()
    }

    pub async fn get(&self, trip_id: &str, entity_id: &str) -> Option<T> {
        let entries = self.entries.read().await;
        entries
            .get(trip_id)?
            .items
            .iter()
            .find(|item| item.entity_id() == entity_id)
            .cloned()
    }

    /// Replace an entity in place, or insert it at the front
    pub async fn upsert(&self, trip_id: &str, item: T) {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(trip_id.to_string())
            .or_insert_with(|| QueryEntry {
                items: Vec::new(),
                fetched_at: Utc::now(),
                stale: true,
            });

        match entry
            .items
            .iter_mut()
            .find(|existing| existing.entity_id() == item.entity_id())
        {
            Some(existing) => *existing = item,
            None => entry.items.insert(0, item),
        }
    }

    pub async fn remove(&self, trip_id: &str, entity_id: &str) -> Option<T> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(trip_id)?;
        let index = entry
            .items
            .iter()
            .position(|item| item.entity_id() == entity_id)?;
        Some(entry.items.remove(index))
    }

    /// Install `value`, or remove the entity when `None`
    pub async fn set(&self, trip_id: &str, entity_id: &str, value: Option<T>) {
        match value {
            Some(item) => self.upsert(trip_id, item).await,
            None => {
                self.remove(trip_id, entity_id).await;
            }
        }
    }

    /// Mark a trip's list as needing a refetch
    pub async fn invalidate(&self, trip_id: &str) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(trip_id) {
            entry.stale = true;
        }
    }

    /// Whether the list is missing or invalidated
    pub async fn is_stale(&self, trip_id: &str) -> bool {
        let entries = self.entries.read().await;
        entries.get(trip_id).map(|entry| entry.stale).unwrap_or(true)
    }

    pub async fn fetched_at(&self, trip_id: &str) -> Option<DateTime<Utc>> {
        let entries = self.entries.read().await;
        entries.get(trip_id).map(|entry| entry.fetched_at)
    }
}

impl<T: Identified + Clone> Default for QueryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A change installed ahead of server confirmation
#[derive(Debug, Clone)]
pub struct OptimisticUpdate<T> {
    pub id: Uuid,
    pub trip_id: String,
    pub entity_id: String,
    /// Value before the update; `None` when the entity did not exist
    pub previous: Option<T>,
    /// Value installed; `None` when the update deletes the entity
    pub current: Option<T>,
    /// Offline operation carrying this update, once queued
    pub operation_id: Option<Uuid>,
    pub applied_at: DateTime<Utc>,
    seq: u64,
}

/// Optimistic update manager
#[derive(Debug)]
pub struct OptimisticManager<T> {
    store: Arc<QueryStore<T>>,
    updates: RwLock<HashMap<Uuid, OptimisticUpdate<T>>>,
    next_seq: AtomicU64,
}

impl<T: Identified + Clone> OptimisticManager<T> {
    pub fn new(store: Arc<QueryStore<T>>) -> Self {
        Self {
            store,
            updates: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<QueryStore<T>> {
        &self.store
    }

    /// Install `next` in the query store and remember what it replaced
    pub async fn apply(&self, trip_id: &str, entity_id: &str, next: Option<T>) -> Uuid {
        let previous = self.store.get(trip_id, entity_id).await;
        self.store.set(trip_id, entity_id, next.clone()).await;

        let update = OptimisticUpdate {
            id: Uuid::new_v4(),
            trip_id: trip_id.to_string(),
            entity_id: entity_id.to_string(),
            previous,
            current: next,
            operation_id: None,
            applied_at: Utc::now(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        let id = update.id;

        let mut updates = self.updates.write().await;
        updates.insert(id, update);
        id
    }

    /// Tie an update to the offline operation that will replay it
    pub async fn mark_queued(&self, update_id: &Uuid, operation_id: Uuid) {
        let mut updates = self.updates.write().await;
        if let Some(update) = updates.get_mut(update_id) {
            update.operation_id = Some(operation_id);
        }
    }

    /// Forget a confirmed update
    pub async fn confirm(&self, update_id: &Uuid) {
        let mut updates = self.updates.write().await;
        updates.remove(update_id);
    }

    /// Forget the update carried by a replayed operation
    pub async fn confirm_operation(&self, operation_id: &Uuid) -> Option<OptimisticUpdate<T>> {
        let mut updates = self.updates.write().await;
        let update_id = updates
            .values()
            .find(|update| update.operation_id == Some(*operation_id))
            .map(|update| update.id)?;
        updates.remove(&update_id)
    }

    /// Restore the value an update replaced
    pub async fn rollback(&self, update_id: &Uuid) -> Option<OptimisticUpdate<T>> {
        let update = {
            let mut updates = self.updates.write().await;
            updates.remove(update_id)?
        };
        self.store
            .set(&update.trip_id, &update.entity_id, update.previous.clone())
            .await;
        Some(update)
    }

    pub async fn pending_updates(&self) -> Vec<OptimisticUpdate<T>> {
        let updates = self.updates.read().await;
        let mut pending: Vec<_> = updates.values().cloned().collect();
        pending.sort_by_key(|update| update.seq);
        pending
    }

    pub async fn count_pending(&self) -> usize {
        self.updates.read().await.len()
    }
}
