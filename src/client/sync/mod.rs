//! # Background Sync Service
//!
//! Replays the offline queue against the backend.
//!
//! ## Architecture
//!
//! - **Replay pass**: pending operations are sent in insertion order. A
//!   transient failure stops the pass so later operations never overtake an
//!   earlier one. A permanent failure marks the operation failed and moves on.
//! - **Background task**: runs a pass whenever the network monitor reports a
//!   transition to online, and on a fixed interval. After a pass that stopped
//!   on a transient failure the next pass waits out an exponential backoff.
//! - **Network Monitor**: connectivity signal shared with the mutation
//!   services
//!
//! ## Usage
//!
//! ```rust,no_run
//! # async fn example(
//! #     sync: tripsync::client::sync::SyncService,
//! # ) -> Result<(), tripsync::client::local_db::StoreError> {
//! // Start background sync
//! sync.start().await;
//!
//! // Force immediate replay
//! let report = sync.replay_pending().await?;
//! println!("{} replayed, {} still pending", report.replayed, report.remaining);
//!
//! let status = sync.status().await;
//! println!("Sync status: {:?}", status);
//! # Ok(())
//! # }
//! ```

pub mod network_monitor;

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::client::local_db::{LocalDatabase, StoreError};
use crate::client::offline::queue::{OperationQueue, QueuedOperation};
use crate::client::offline::retry::BackoffStrategy;
use crate::client::polls::PollService;
use crate::shared::config::SyncSettings;
use network_monitor::NetworkMonitor;

/// Why a queued operation could not be replayed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReplayError {
    /// Worth retrying later as-is
    #[error("Transient replay failure: {0}")]
    Transient(String),
    /// Will never succeed; needs manual resolution
    #[error("Permanent replay failure: {0}")]
    Permanent(String),
}

/// Outcome of one replay pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub replayed: usize,
    pub failed: usize,
    /// Operations still pending after the pass
    pub remaining: usize,
}

/// Current synchronization state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub pending_operations: u64,
    pub failed_operations: u64,
    pub online: bool,
    pub last_error: Option<String>,
}

struct SyncInner {
    queue: OperationQueue,
    polls: Arc<PollService>,
    network: Arc<NetworkMonitor>,
    db: Arc<LocalDatabase>,
    settings: SyncSettings,
    status: RwLock<SyncStatus>,
    /// Serializes replay passes
    pass_lock: Mutex<()>,
}

/// Main sync service coordinator
pub struct SyncService {
    inner: Arc<SyncInner>,
    background_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncService {
    pub fn new(
        queue: OperationQueue,
        polls: Arc<PollService>,
        network: Arc<NetworkMonitor>,
        db: Arc<LocalDatabase>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                queue,
                polls,
                network,
                db,
                settings,
                status: RwLock::new(SyncStatus::default()),
                pass_lock: Mutex::new(()),
            }),
            background_task: Mutex::new(None),
        }
    }

    /// Replay pending operations once
    ///
    /// A local storage failure aborts the pass and is returned; operations
    /// not reached stay queued.
    pub async fn replay_pending(&self) -> Result<ReplayReport, StoreError> {
        self.inner.replay_pending().await.map_err(|e| {
            tracing::error!(error = %e, "Replay pass aborted");
            e
        })
    }

    /// Start the background sync task; a second call is a no-op
    pub async fn start(&self) {
        let mut task = self.background_task.lock().await;
        if task.as_ref().map(|handle| !handle.is_finished()).unwrap_or(false) {
            return;
        }

        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move {
            inner.background_loop().await;
        }));
        tracing::info!("Background sync started");
    }

    /// Stop the background sync task
    pub async fn stop(&self) {
        if let Some(handle) = self.background_task.lock().await.take() {
            handle.abort();
            tracing::info!("Background sync stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.background_task
            .lock()
            .await
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Get current sync status
    pub async fn status(&self) -> SyncStatus {
        let mut status = self.inner.status.read().await.clone();
        status.online = self.inner.network.is_online();
        if status.last_sync.is_none() {
            status.last_sync = self
                .inner
                .db
                .get_last_sync_time()
                .await
                .ok()
                .flatten()
                .and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
                .map(|time| time.with_timezone(&Utc));
        }
        if let Ok(stats) = self.inner.queue.stats().await {
            status.pending_operations = stats.pending + stats.in_progress;
            status.failed_operations = stats.failed;
        }
        status
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        if let Some(handle) = self.background_task.get_mut().take() {
            handle.abort();
        }
    }
}

impl SyncInner {
    async fn replay_pending(&self) -> Result<ReplayReport, StoreError> {
        let result = self.replay_locked().await;
        if let Err(e) = &result {
            let mut status = self.status.write().await;
            status.is_syncing = false;
            status.last_error = Some(e.to_string());
        }
        result
    }

    async fn replay_locked(&self) -> Result<ReplayReport, StoreError> {
        let _pass = self.pass_lock.lock().await;
        let mut report = ReplayReport::default();

        if !self.network.is_online() {
            report.remaining = self.queue.pending_operations().await?.len();
            return Ok(report);
        }

        self.status.write().await.is_syncing = true;
        self.run_pass(&mut report).await?;
        {
            let mut status = self.status.write().await;
            status.is_syncing = false;
            status.last_sync = Some(Utc::now());
        }

        if report.replayed > 0 {
            self.db.set_last_sync_time().await?;
        }
        report.remaining = self.queue.pending_operations().await?.len();
        tracing::info!(
            replayed = report.replayed,
            failed = report.failed,
            remaining = report.remaining,
            "Replay pass finished"
        );
        Ok(report)
    }

    async fn run_pass(&self, report: &mut ReplayReport) -> Result<(), StoreError> {
        let mut touched_trips = BTreeSet::new();

        for operation in self.queue.pending_operations().await? {
            if !self.network.is_online() {
                break;
            }

            self.queue.start_operation(&operation.id).await?;
            match self.polls.replay(&operation).await {
                Ok(()) => {
                    self.queue.complete_operation(&operation.id).await?;
                    touched_trips.insert(operation.trip_id.clone());
                    report.replayed += 1;
                }
                Err(ReplayError::Transient(message)) => {
                    if operation.retry_count + 1 >= self.settings.max_retry_attempts {
                        self.give_up(&operation, &message).await?;
                        report.failed += 1;
                        continue;
                    }
                    tracing::warn!(operation_id = %operation.id, error = %message, "Replay deferred");
                    self.queue.record_retry(&operation.id, &message).await?;
                    self.status.write().await.last_error = Some(message);
                    break;
                }
                Err(ReplayError::Permanent(message)) => {
                    self.give_up(&operation, &message).await?;
                    report.failed += 1;
                }
            }
        }

        for trip_id in touched_trips {
            self.polls.refresh(&trip_id).await;
        }
        Ok(())
    }

    async fn give_up(&self, operation: &QueuedOperation, message: &str) -> Result<(), StoreError> {
        self.queue.fail_operation(&operation.id, message).await?;
        self.polls.abandon(operation, message).await;
        Ok(())
    }

    async fn background_loop(self: Arc<Self>) {
        let mut online = self.network.subscribe();
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.settings.sync_interval_seconds.max(1)));
        let backoff = BackoffStrategy::Exponential {
            base: Duration::from_millis(self.settings.backoff_base_ms),
            max: Duration::from_millis(self.settings.backoff_max_ms),
        };
        let mut deferred_passes = 0u32;

        loop {
            tokio::select! {
                changed = online.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if !*online.borrow_and_update() {
                        continue;
                    }
                    tracing::info!("Back online, replaying queued operations");
                    deferred_passes = 0;
                }
                _ = interval.tick() => {}
            }

            if deferred_passes > 0 {
                tokio::time::sleep(backoff.delay_for(deferred_passes)).await;
            }

            match self.replay_pending().await {
                Ok(report) if report.remaining > 0 && self.network.is_online() => {
                    deferred_passes = deferred_passes.saturating_add(1);
                }
                Ok(_) => deferred_passes = 0,
                Err(e) => {
                    tracing::error!(error = %e, "Background replay failed");
                    deferred_passes = deferred_passes.saturating_add(1);
                }
            }
        }
    }
}
