//! Basecamp service
//!
//! Reads fall back to the cache when offline. Updates are online-only: an
//! offline attempt returns [`MutationError::Offline`] without touching the
//! backend, the cache or the queue.

use std::sync::Arc;

use crate::client::api::Backend;
use crate::client::error::MutationError;
use crate::client::notify::{Haptics, Notice, NoticeLevel, Notifier};
use crate::client::offline::cache::EntityCache;
use crate::client::sync::network_monitor::NetworkMonitor;
use crate::shared::basecamp::Basecamp;
use crate::shared::entity::{EntityKey, EntityType};

pub struct BasecampService {
    backend: Arc<dyn Backend>,
    cache: EntityCache,
    network: Arc<NetworkMonitor>,
    notifier: Arc<dyn Notifier>,
    haptics: Arc<dyn Haptics>,
}

impl BasecampService {
    pub fn new(
        backend: Arc<dyn Backend>,
        cache: EntityCache,
        network: Arc<NetworkMonitor>,
        notifier: Arc<dyn Notifier>,
        haptics: Arc<dyn Haptics>,
    ) -> Self {
        Self {
            backend,
            cache,
            network,
            notifier,
            haptics,
        }
    }

    /// Basecamp of a trip, from the backend when reachable
    pub async fn fetch_basecamp(&self, trip_id: &str) -> Option<Basecamp> {
        if self.network.is_online() {
            match self.backend.get_basecamp(trip_id).await {
                Ok(Some(basecamp)) => {
                    self.cache
                        .cache_entity(trip_id, EntityType::Basecamp, trip_id, &basecamp, None)
                        .await;
                    return Some(basecamp);
                }
                Ok(None) => {
                    self.cache.remove_entity(&EntityKey::basecamp(trip_id)).await;
                    return None;
                }
                Err(e) => {
                    tracing::warn!(trip_id, error = %e, "Basecamp fetch failed, reading cache");
                }
            }
        }

        self.cache
            .get_cached_entity(&EntityKey::basecamp(trip_id))
            .await
            .and_then(|entity| entity.decode::<Basecamp>().ok())
    }

    pub async fn update_basecamp(
        &self,
        basecamp: &Basecamp,
        user_id: &str,
    ) -> Result<Basecamp, MutationError> {
        basecamp.validate()?;

        if !self.network.is_online() {
            tracing::info!(trip_id = %basecamp.trip_id, "Basecamp update blocked while offline");
            return Err(MutationError::offline(
                None,
                "Basecamp changes need a connection",
            ));
        }

        match self.backend.set_basecamp(basecamp, user_id).await {
            Ok(saved) => {
                self.cache
                    .cache_entity(&saved.trip_id, EntityType::Basecamp, &saved.trip_id, &saved, None)
                    .await;
                self.haptics.success();
                self.notifier.notify(Notice::new(
                    NoticeLevel::Success,
                    "Basecamp updated",
                    saved.name.clone(),
                ));
                Ok(saved)
            }
            Err(e) => {
                tracing::error!(trip_id = %basecamp.trip_id, error = %e, "Basecamp update failed");
                self.notifier.notify(Notice::new(
                    NoticeLevel::Error,
                    "Failed to update basecamp",
                    e.to_string(),
                ));
                Err(MutationError::Failed {
                    action: "update basecamp",
                    source: e,
                })
            }
        }
    }
}
