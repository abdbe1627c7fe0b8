//! # Poll Service
//!
//! Optimistic mutation controller for polls.
//!
//! Every mutation runs the same pipeline:
//!
//! 1. **Guard**: the poll rules are checked against the current local copy.
//!    A violation returns [`MutationError::Validation`] before any I/O.
//! 2. **Optimistic apply**: the pure transition from `shared::poll` produces
//!    the new value, which replaces the old one in the query store and the
//!    entity cache. The replaced value is kept for rollback.
//! 3. **Dispatch**: offline, the change is queued and
//!    [`MutationError::Offline`] is returned with the optimistic value left in
//!    place. Online, the backend is called with the last known version.
//! 4. **Reconcile**: a confirmed value replaces the guess and the trip's
//!    polls are refetched; a version conflict refetches as well; any other
//!    failure restores the snapshot before refetching.
//!
//! Queued changes stay visible across refetches until replay confirms or
//! abandons them: every online refetch re-applies the trip's pending queue
//! entries to the server list, so this also holds after a restart.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::client::api::{ApiError, Backend};
use crate::client::error::MutationError;
use crate::client::notify::{Haptics, Notice, NoticeLevel, Notifier};
use crate::client::offline::cache::EntityCache;
use crate::client::offline::optimistic::{OptimisticManager, QueryStore};
use crate::client::offline::queue::{OperationAction, OperationKind, OperationQueue, QueuedOperation};
use crate::client::offline::reconciliation::{ReconciliationManager, ReconciliationOutcome};
use crate::client::sync::network_monitor::NetworkMonitor;
use crate::client::sync::ReplayError;
use crate::shared::entity::{EntityKey, EntityType};
use crate::shared::error::SharedError;
use crate::shared::poll::{NewPoll, Poll};

/// A poll mutation, as queued for replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PollCommand {
    Create { poll: Poll },
    Vote { option_ids: Vec<String> },
    RemoveVote,
    Close,
    Delete,
}

impl PollCommand {
    pub fn kind(&self) -> OperationKind {
        match self {
            PollCommand::Create { .. } => OperationKind::PollCreate,
            PollCommand::Vote { .. } => OperationKind::PollVote,
            PollCommand::RemoveVote => OperationKind::PollRemoveVote,
            PollCommand::Close => OperationKind::PollClose,
            PollCommand::Delete => OperationKind::PollDelete,
        }
    }

    pub fn action(&self) -> OperationAction {
        match self {
            PollCommand::Create { .. } => OperationAction::Create,
            PollCommand::Delete => OperationAction::Delete,
            _ => OperationAction::Update,
        }
    }

    /// Verb used in notices, e.g. "Failed to vote"
    pub fn label(&self) -> &'static str {
        match self {
            PollCommand::Create { .. } => "create poll",
            PollCommand::Vote { .. } => "vote",
            PollCommand::RemoveVote => "remove vote",
            PollCommand::Close => "close poll",
            PollCommand::Delete => "delete poll",
        }
    }

    /// Pure transition; `None` means the poll is gone afterwards
    pub fn apply(&self, current: Option<&Poll>, user_id: &str) -> Result<Option<Poll>, SharedError> {
        if let PollCommand::Create { poll } = self {
            return Ok(Some(poll.clone()));
        }

        let current = current.ok_or_else(|| SharedError::not_found("poll", "unknown"))?;
        let mut next = current.clone();
        match self {
            PollCommand::Vote { option_ids } => next.apply_vote(user_id, option_ids)?,
            PollCommand::RemoveVote => next.remove_vote(user_id)?,
            PollCommand::Close => next.close(user_id)?,
            PollCommand::Delete => {
                current.ensure_creator(user_id, "delete")?;
                return Ok(None);
            }
            PollCommand::Create { .. } => {}
        }
        Ok(Some(next))
    }
}

/// Payload stored with a queued poll operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOperationPayload {
    pub user_id: String,
    /// Version the change was computed against
    pub expected_version: Option<i64>,
    pub command: PollCommand,
}

/// Poll queries and mutations for one client
pub struct PollService {
    backend: Arc<dyn Backend>,
    cache: EntityCache,
    queue: OperationQueue,
    network: Arc<NetworkMonitor>,
    optimistic: OptimisticManager<Poll>,
    notifier: Arc<dyn Notifier>,
    haptics: Arc<dyn Haptics>,
}

impl PollService {
    pub fn new(
        backend: Arc<dyn Backend>,
        cache: EntityCache,
        queue: OperationQueue,
        network: Arc<NetworkMonitor>,
        notifier: Arc<dyn Notifier>,
        haptics: Arc<dyn Haptics>,
    ) -> Self {
        Self {
            backend,
            cache,
            queue,
            network,
            optimistic: OptimisticManager::new(Arc::new(QueryStore::new())),
            notifier,
            haptics,
        }
    }

    /// Query state used for rendering
    pub fn store(&self) -> &Arc<QueryStore<Poll>> {
        self.optimistic.store()
    }

    /// Current query state of a trip, without fetching
    pub async fn polls(&self, trip_id: &str) -> Vec<Poll> {
        self.store().list(trip_id).await
    }

    pub async fn poll(&self, trip_id: &str, poll_id: &str) -> Option<Poll> {
        self.store().get(trip_id, poll_id).await
    }

    /// Fetch the polls of a trip
    ///
    /// Online, the backend list is merged with still-queued changes and
    /// written through to the cache. Offline, or when the backend read
    /// fails, the cache is read instead.
    pub async fn fetch_polls(&self, trip_id: &str) -> Vec<Poll> {
        self.refresh(trip_id).await
    }

    pub async fn create_poll(
        &self,
        trip_id: &str,
        user_id: &str,
        request: &NewPoll,
    ) -> Result<Poll, MutationError> {
        let poll = Poll::from_new(Uuid::new_v4().to_string(), trip_id, user_id, request)?;
        let poll_id = poll.id.clone();
        let command = PollCommand::Create { poll };
        let confirmed = self.mutate(trip_id, &poll_id, user_id, command).await?;
        expect_poll(confirmed, "create poll")
    }

    /// Vote for one or more options in a single submission
    pub async fn vote(
        &self,
        trip_id: &str,
        poll_id: &str,
        user_id: &str,
        option_ids: &[String],
    ) -> Result<Poll, MutationError> {
        let command = PollCommand::Vote {
            option_ids: option_ids.to_vec(),
        };
        let confirmed = self.mutate(trip_id, poll_id, user_id, command).await?;
        expect_poll(confirmed, "vote")
    }

    pub async fn remove_vote(
        &self,
        trip_id: &str,
        poll_id: &str,
        user_id: &str,
    ) -> Result<Poll, MutationError> {
        let confirmed = self
            .mutate(trip_id, poll_id, user_id, PollCommand::RemoveVote)
            .await?;
        expect_poll(confirmed, "remove vote")
    }

    pub async fn close_poll(
        &self,
        trip_id: &str,
        poll_id: &str,
        user_id: &str,
    ) -> Result<Poll, MutationError> {
        let confirmed = self.mutate(trip_id, poll_id, user_id, PollCommand::Close).await?;
        expect_poll(confirmed, "close poll")
    }

    pub async fn delete_poll(
        &self,
        trip_id: &str,
        poll_id: &str,
        user_id: &str,
    ) -> Result<(), MutationError> {
        self.mutate(trip_id, poll_id, user_id, PollCommand::Delete).await?;
        Ok(())
    }

    /// Latest local copy of a poll: query state first, then the cache
    async fn current(&self, trip_id: &str, poll_id: &str) -> Option<Poll> {
        if let Some(poll) = self.store().get(trip_id, poll_id).await {
            return Some(poll);
        }
        self.cache
            .get_cached_entity(&EntityKey::poll(trip_id, poll_id))
            .await
            .and_then(|entity| entity.decode::<Poll>().ok())
    }

    async fn mutate(
        &self,
        trip_id: &str,
        poll_id: &str,
        user_id: &str,
        command: PollCommand,
    ) -> Result<Option<Poll>, MutationError> {
        let label = command.label();
        let current = self.current(trip_id, poll_id).await;
        if current.is_none() && !matches!(command, PollCommand::Create { .. }) {
            return Err(SharedError::not_found("poll", poll_id).into());
        }

        let next = command.apply(current.as_ref(), user_id)?;
        let expected_version = current.as_ref().map(|poll| poll.version);

        let update_id = self.optimistic.apply(trip_id, poll_id, next.clone()).await;
        self.persist(trip_id, poll_id, next.as_ref()).await;

        if !self.network.is_online() {
            return Err(self
                .enqueue(update_id, trip_id, poll_id, user_id, expected_version, command)
                .await);
        }

        match self
            .dispatch(&command, poll_id, user_id, expected_version)
            .await
        {
            Ok(confirmed) => {
                self.optimistic.confirm(&update_id).await;
                if let Some(poll) = &confirmed {
                    let mut guess = next.clone();
                    if let Some(guess) = guess.as_mut() {
                        guess.version = poll.version;
                    }
                    if ReconciliationManager::compare(guess.as_ref(), poll)
                        == ReconciliationOutcome::Diverged
                    {
                        tracing::debug!(poll_id, "Server result differs from optimistic value");
                    }
                    self.store().upsert(trip_id, poll.clone()).await;
                }
                self.persist(trip_id, poll_id, confirmed.as_ref()).await;
                self.haptics.success();
                tracing::info!(trip_id, poll_id, action = label, "Poll mutation confirmed");
                self.refresh(trip_id).await;
                Ok(confirmed)
            }
            Err(ApiError::Conflict { .. }) => {
                tracing::warn!(trip_id, poll_id, ?expected_version, "Poll changed elsewhere");
                self.rollback(&update_id).await;
                self.notifier.notify(Notice::new(
                    NoticeLevel::Info,
                    "Poll updated",
                    "This poll was updated elsewhere, refreshing",
                ));
                self.store().invalidate(trip_id).await;
                self.refresh(trip_id).await;
                Err(MutationError::Conflict {
                    entity: EntityKey::poll(trip_id, poll_id),
                    expected: expected_version.unwrap_or_default(),
                })
            }
            Err(e) => {
                tracing::error!(trip_id, poll_id, action = label, error = %e, "Poll mutation failed");
                self.rollback(&update_id).await;
                self.notifier.notify(Notice::new(
                    NoticeLevel::Error,
                    format!("Failed to {}", label),
                    e.to_string(),
                ));
                self.refresh(trip_id).await;
                Err(MutationError::Failed {
                    action: label,
                    source: e,
                })
            }
        }
    }

    /// Queue an offline change; the optimistic value stays in place
    async fn enqueue(
        &self,
        update_id: Uuid,
        trip_id: &str,
        poll_id: &str,
        user_id: &str,
        expected_version: Option<i64>,
        command: PollCommand,
    ) -> MutationError {
        let label = command.label();
        let kind = command.kind();
        let action = command.action();
        let target_id = match action {
            OperationAction::Create => None,
            _ => Some(poll_id.to_string()),
        };
        let payload = PollOperationPayload {
            user_id: user_id.to_string(),
            expected_version,
            command,
        };

        let queued = match serde_json::to_value(&payload) {
            Ok(payload) => {
                self.queue
                    .queue_operation(kind, action, trip_id, payload, target_id)
                    .await
            }
            Err(e) => Err(e.into()),
        };

        match queued {
            Ok(operation_id) => {
                self.optimistic.mark_queued(&update_id, operation_id).await;
                self.notifier.notify(Notice::new(
                    NoticeLevel::Info,
                    "Saved offline",
                    format!("Your {} will sync when you're back online", label),
                ));
                self.haptics.light();
                MutationError::offline(
                    Some(operation_id),
                    format!("{} queued, will sync when online", label),
                )
            }
            Err(e) => {
                tracing::error!(trip_id, poll_id, error = %e, "Failed to queue offline change");
                self.rollback(&update_id).await;
                self.notifier.notify(Notice::new(
                    NoticeLevel::Error,
                    format!("Failed to {}", label),
                    "The change could not be saved on this device",
                ));
                MutationError::Storage(e)
            }
        }
    }

    async fn dispatch(
        &self,
        command: &PollCommand,
        poll_id: &str,
        user_id: &str,
        version: Option<i64>,
    ) -> Result<Option<Poll>, ApiError> {
        let version = version.unwrap_or_default();
        match command {
            PollCommand::Create { poll } => self.backend.create_poll(poll).await.map(Some),
            PollCommand::Vote { option_ids } => self
                .backend
                .vote_on_poll(poll_id, option_ids, user_id, version)
                .await
                .map(Some),
            PollCommand::RemoveVote => self
                .backend
                .remove_vote(poll_id, user_id, version)
                .await
                .map(Some),
            PollCommand::Close => self
                .backend
                .close_poll(poll_id, user_id, version)
                .await
                .map(Some),
            PollCommand::Delete => self.backend.delete_poll(poll_id, user_id).await.map(|_| None),
        }
    }

    /// Restore the snapshot of an update in the query store and the cache
    async fn rollback(&self, update_id: &Uuid) {
        if let Some(update) = self.optimistic.rollback(update_id).await {
            self.persist(&update.trip_id, &update.entity_id, update.previous.as_ref())
                .await;
        }
    }

    async fn persist(&self, trip_id: &str, poll_id: &str, poll: Option<&Poll>) {
        match poll {
            Some(poll) => self.cache.cache_poll(poll).await,
            None => self.cache.remove_entity(&EntityKey::poll(trip_id, poll_id)).await,
        }
    }

    /// Reload a trip's polls into the query store
    pub async fn refresh(&self, trip_id: &str) -> Vec<Poll> {
        if self.network.is_online() {
            match self.backend.list_polls(trip_id).await {
                Ok(server) => {
                    let merged = self.overlay_queued(trip_id, server).await;
                    self.write_through(trip_id, &merged).await;
                    self.store().set_list(trip_id, merged.clone()).await;
                    return merged;
                }
                Err(e) => {
                    tracing::warn!(trip_id, error = %e, "Poll fetch failed, reading cache");
                }
            }
        }

        let cached: Vec<Poll> = self.cache.cached(trip_id, EntityType::Poll).await;
        tracing::debug!(trip_id, count = cached.len(), "Serving polls from cache");
        self.store().set_list(trip_id, cached.clone()).await;
        cached
    }

    /// Re-apply the trip's queued changes on top of a server list
    ///
    /// Reads the durable queue, so changes queued before a restart stay
    /// visible. Changes that no longer apply to the server copy are skipped
    /// here and left for replay to resolve.
    async fn overlay_queued(&self, trip_id: &str, server: Vec<Poll>) -> Vec<Poll> {
        let operations = match self.queue.pending_operations().await {
            Ok(operations) => operations,
            Err(e) => {
                tracing::warn!(trip_id, error = %e, "Failed to read queue, showing server polls");
                return server;
            }
        };

        let mut items = server;
        for operation in operations.iter().filter(|op| op.trip_id == trip_id) {
            let Some((payload, poll_id)) = decode_operation(operation) else {
                continue;
            };
            let current = items.iter().find(|poll| poll.id == poll_id);
            match payload.command.apply(current, &payload.user_id) {
                Ok(next) => items = ReconciliationManager::merge(items, &[(poll_id, next)]),
                Err(e) => tracing::debug!(
                    operation_id = %operation.id,
                    poll_id = %poll_id,
                    error = %e,
                    "Queued change no longer applies to server copy"
                ),
            }
        }
        items
    }

    /// Make the cache mirror `polls`
    async fn write_through(&self, trip_id: &str, polls: &[Poll]) {
        let live: HashSet<&str> = polls.iter().map(|poll| poll.id.as_str()).collect();
        for entity in self.cache.get_cached_entities(trip_id, EntityType::Poll).await {
            if !live.contains(entity.key.entity_id.as_str()) {
                self.cache.remove_entity(&entity.key).await;
            }
        }
        for poll in polls {
            self.cache.cache_poll(poll).await;
        }
    }

    /// Send one queued operation to the backend
    ///
    /// A vote, vote removal or close that hits a version conflict is
    /// re-checked against a fresh copy and resubmitted once. A create that
    /// conflicts and a delete of a missing poll already took effect.
    pub async fn replay(&self, operation: &QueuedOperation) -> Result<(), ReplayError> {
        let payload: PollOperationPayload = serde_json::from_value(operation.payload.clone())
            .map_err(|e| ReplayError::Permanent(format!("Undecodable payload: {}", e)))?;
        let poll_id = target_poll_id(&payload.command, operation)
            .ok_or_else(|| ReplayError::Permanent("Operation has no target".to_string()))?;

        let outcome = match self
            .dispatch(&payload.command, &poll_id, &payload.user_id, payload.expected_version)
            .await
        {
            Err(ApiError::Conflict { .. }) if matches!(payload.command, PollCommand::Create { .. }) => {
                Ok(())
            }
            Err(ApiError::NotFound(_)) if matches!(payload.command, PollCommand::Delete) => Ok(()),
            Err(ApiError::Conflict { .. }) => {
                self.resubmit(&operation.trip_id, &poll_id, &payload).await
            }
            other => other.map(|_| ()),
        };

        match outcome {
            Ok(()) => {
                self.optimistic.confirm_operation(&operation.id).await;
                tracing::info!(
                    operation_id = %operation.id,
                    kind = %operation.kind,
                    poll_id = %poll_id,
                    "Replayed queued poll operation"
                );
                Ok(())
            }
            Err(e) if e.is_transient() || e.is_conflict() => Err(ReplayError::Transient(e.to_string())),
            Err(e) => Err(ReplayError::Permanent(e.to_string())),
        }
    }

    /// Re-check a queued change against the server copy and send it again
    async fn resubmit(
        &self,
        trip_id: &str,
        poll_id: &str,
        payload: &PollOperationPayload,
    ) -> Result<(), ApiError> {
        let fresh = self
            .backend
            .list_polls(trip_id)
            .await?
            .into_iter()
            .find(|poll| poll.id == poll_id)
            .ok_or_else(|| ApiError::NotFound(format!("poll {}", poll_id)))?;

        // An earlier attempt may have landed before its response was lost
        if let PollCommand::Vote { option_ids } = &payload.command {
            if fresh.has_selection(&payload.user_id, option_ids) {
                return Ok(());
            }
        }

        payload
            .command
            .apply(Some(&fresh), &payload.user_id)
            .map_err(|e| ApiError::Rejected(e.to_string()))?;

        tracing::debug!(poll_id, version = fresh.version, "Resubmitting with fresh version");
        self.dispatch(&payload.command, poll_id, &payload.user_id, Some(fresh.version))
            .await
            .map(|_| ())
    }

    /// Give up on a queued change that can no longer be applied
    ///
    /// The optimistic overlay is dropped and the trip is refetched so the
    /// query state falls back to server truth.
    pub async fn abandon(&self, operation: &QueuedOperation, reason: &str) {
        self.optimistic.confirm_operation(&operation.id).await;
        let label = serde_json::from_value::<PollOperationPayload>(operation.payload.clone())
            .map(|payload| payload.command.label())
            .unwrap_or("sync change");
        self.notifier.notify(Notice::new(
            NoticeLevel::Error,
            format!("Failed to {}", label),
            reason.to_string(),
        ));
        self.refresh(&operation.trip_id).await;
    }

    /// Number of changes applied locally and not yet confirmed
    pub async fn pending_changes(&self) -> usize {
        self.optimistic.count_pending().await
    }
}

/// Poll a queued operation targets
fn target_poll_id(command: &PollCommand, operation: &QueuedOperation) -> Option<String> {
    match (command, &operation.target_id) {
        (PollCommand::Create { poll }, _) => Some(poll.id.clone()),
        (_, target) => target.clone(),
    }
}

fn decode_operation(operation: &QueuedOperation) -> Option<(PollOperationPayload, String)> {
    let payload: PollOperationPayload = serde_json::from_value(operation.payload.clone()).ok()?;
    let poll_id = target_poll_id(&payload.command, operation)?;
    Some((payload, poll_id))
}

fn expect_poll(confirmed: Option<Poll>, action: &'static str) -> Result<Poll, MutationError> {
    confirmed.ok_or_else(|| MutationError::Failed {
        action,
        source: ApiError::Decode("backend returned no poll".to_string()),
    })
}
