use std::sync::Arc;

use crate::client::api::{Backend, HttpBackend, MemoryBackend};
use crate::client::basecamp::BasecampService;
use crate::client::config::Config;
use crate::client::local_db::{LocalDatabase, StoreError};
use crate::client::notify::{Haptics, NoopHaptics, Notifier, TracingNotifier};
use crate::client::offline::cache::EntityCache;
use crate::client::offline::queue::OperationQueue;
use crate::client::polls::PollService;
use crate::client::sync::network_monitor::NetworkMonitor;
use crate::client::sync::SyncService;

/// Explicit application context.
///
/// Built once in a fixed order: database, cache and queue, network monitor,
/// backend, services, then the sync service that replays for them.
pub struct AppState {
    pub config: Config,
    pub db: Arc<LocalDatabase>,
    pub cache: EntityCache,
    pub queue: OperationQueue,
    pub network: Arc<NetworkMonitor>,
    pub backend: Arc<dyn Backend>,
    pub polls: Arc<PollService>,
    pub basecamps: BasecampService,
    pub sync: SyncService,
}

impl AppState {
    /// Open the configured database and pick the backend
    ///
    /// Demo mode swaps the hosted backend for the in-process one.
    pub async fn initialize(config: Config) -> Result<Self, StoreError> {
        let db = LocalDatabase::open(config.database_path()).await?;
        let backend: Arc<dyn Backend> = if config.demo_mode() {
            tracing::info!("Demo mode, using in-memory backend");
            Arc::new(MemoryBackend::new())
        } else {
            Arc::new(HttpBackend::from_config(&config))
        };

        Ok(Self::assemble(
            config,
            Arc::new(db),
            backend,
            Arc::new(TracingNotifier),
            Arc::new(NoopHaptics),
        ))
    }

    pub fn assemble(
        config: Config,
        db: Arc<LocalDatabase>,
        backend: Arc<dyn Backend>,
        notifier: Arc<dyn Notifier>,
        haptics: Arc<dyn Haptics>,
    ) -> Self {
        let cache = EntityCache::new(db.clone());
        let queue = OperationQueue::new(db.clone());
        let network = Arc::new(NetworkMonitor::new(true));

        let polls = Arc::new(PollService::new(
            backend.clone(),
            cache.clone(),
            queue.clone(),
            network.clone(),
            notifier.clone(),
            haptics.clone(),
        ));
        let basecamps = BasecampService::new(
            backend.clone(),
            cache.clone(),
            network.clone(),
            notifier,
            haptics,
        );
        let sync = SyncService::new(
            queue.clone(),
            polls.clone(),
            network.clone(),
            db.clone(),
            config.app.sync.clone(),
        );

        tracing::debug!(demo_mode = config.demo_mode(), "Application state assembled");
        Self {
            config,
            db,
            cache,
            queue,
            network,
            backend,
            polls,
            basecamps,
            sync,
        }
    }
}
