//! In-process backend
//!
//! Holds polls and basecamps in memory and enforces the same rules as the
//! hosted backend: version checks on every poll mutation, a version bump on
//! every accepted one, creator-only close/delete and no votes on closed
//! polls. Used when demo mode is enabled and as the server in tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ApiError, Backend};
use crate::shared::basecamp::Basecamp;
use crate::shared::error::SharedError;
use crate::shared::poll::Poll;

#[derive(Debug, Default)]
struct MemoryState {
    polls: HashMap<String, Poll>,
    basecamps: HashMap<String, Basecamp>,
    /// Returned by the next mutating call instead of executing it
    fail_next: Option<ApiError>,
    /// Reads fail with a network error while set
    reads_failing: bool,
    /// Names of the calls received, in order
    requests: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a poll as if another client had created it
    pub async fn seed_poll(&self, poll: Poll) {
        let mut state = self.state.write().await;
        state.polls.insert(poll.id.clone(), poll);
    }

    pub async fn seed_basecamp(&self, basecamp: Basecamp) {
        let mut state = self.state.write().await;
        state.basecamps.insert(basecamp.trip_id.clone(), basecamp);
    }

    /// Current server copy of a poll
    pub async fn poll(&self, poll_id: &str) -> Option<Poll> {
        self.state.read().await.polls.get(poll_id).cloned()
    }

    /// Make the next mutating call fail with `error`
    pub async fn inject_failure(&self, error: ApiError) {
        self.state.write().await.fail_next = Some(error);
    }

    /// Make every read fail until switched back
    pub async fn fail_reads(&self, failing: bool) {
        self.state.write().await.reads_failing = failing;
    }

    pub async fn request_log(&self) -> Vec<String> {
        self.state.read().await.requests.clone()
    }

    /// Number of received calls named `name`
    pub async fn call_count(&self, name: &str) -> usize {
        self.state
            .read()
            .await
            .requests
            .iter()
            .filter(|request| request.as_str() == name)
            .count()
    }

    /// Apply a version-checked transition to a stored poll
    async fn mutate_poll<F>(
        &self,
        call: &str,
        poll_id: &str,
        version: i64,
        transition: F,
    ) -> Result<Poll, ApiError>
    where
        F: FnOnce(&mut Poll) -> Result<(), SharedError>,
    {
        let mut state = self.state.write().await;
        state.requests.push(call.to_string());
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }

        let poll = state
            .polls
            .get_mut(poll_id)
            .ok_or_else(|| ApiError::NotFound(format!("poll {}", poll_id)))?;

        if poll.version != version {
            tracing::debug!(poll_id, expected = version, current = poll.version, "Rejecting stale write");
            return Err(ApiError::Conflict {
                entity_id: poll_id.to_string(),
                expected: version,
                current: Some(poll.version),
            });
        }

        let mut next = poll.clone();
        transition(&mut next).map_err(rejection)?;
        next.version += 1;
        *poll = next.clone();
        Ok(next)
    }
}

/// Map a rule violation to the error the hosted backend would return
fn rejection(error: SharedError) -> ApiError {
    match error {
        SharedError::NotFound { entity, id } => ApiError::NotFound(format!("{} {}", entity, id)),
        SharedError::ValidationError { ref field, .. } if field == "created_by" => {
            ApiError::Forbidden(error.to_string())
        }
        other => ApiError::Rejected(other.to_string()),
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn list_polls(&self, trip_id: &str) -> Result<Vec<Poll>, ApiError> {
        let mut state = self.state.write().await;
        state.requests.push("list_polls".to_string());
        if state.reads_failing {
            return Err(ApiError::Network("read unavailable".to_string()));
        }

        let mut polls: Vec<Poll> = state
            .polls
            .values()
            .filter(|poll| poll.trip_id == trip_id)
            .cloned()
            .collect();
        polls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(polls)
    }

    async fn create_poll(&self, poll: &Poll) -> Result<Poll, ApiError> {
        let mut state = self.state.write().await;
        state.requests.push("create_poll".to_string());
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }

        if let Some(existing) = state.polls.get(&poll.id) {
            return Err(ApiError::Conflict {
                entity_id: poll.id.clone(),
                expected: poll.version,
                current: Some(existing.version),
            });
        }
        if poll.options.len() < 2 || !poll.is_consistent() {
            return Err(ApiError::Rejected("Malformed poll".to_string()));
        }

        let mut stored = poll.clone();
        stored.version = 1;
        state.polls.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn vote_on_poll(
        &self,
        poll_id: &str,
        option_ids: &[String],
        user_id: &str,
        version: i64,
    ) -> Result<Poll, ApiError> {
        self.mutate_poll("vote_on_poll", poll_id, version, |poll| {
            poll.apply_vote(user_id, option_ids)
        })
        .await
    }

    async fn remove_vote(&self, poll_id: &str, user_id: &str, version: i64) -> Result<Poll, ApiError> {
        self.mutate_poll("remove_vote", poll_id, version, |poll| poll.remove_vote(user_id))
            .await
    }

    async fn close_poll(&self, poll_id: &str, user_id: &str, version: i64) -> Result<Poll, ApiError> {
        self.mutate_poll("close_poll", poll_id, version, |poll| poll.close(user_id))
            .await
    }

    async fn delete_poll(&self, poll_id: &str, user_id: &str) -> Result<(), ApiError> {
        let mut state = self.state.write().await;
        state.requests.push("delete_poll".to_string());
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }

        let poll = state
            .polls
            .get(poll_id)
            .ok_or_else(|| ApiError::NotFound(format!("poll {}", poll_id)))?;
        poll.ensure_creator(user_id, "delete").map_err(rejection)?;
        state.polls.remove(poll_id);
        Ok(())
    }

    async fn get_basecamp(&self, trip_id: &str) -> Result<Option<Basecamp>, ApiError> {
        let mut state = self.state.write().await;
        state.requests.push("get_basecamp".to_string());
        if state.reads_failing {
            return Err(ApiError::Network("read unavailable".to_string()));
        }
        Ok(state.basecamps.get(trip_id).cloned())
    }

    async fn set_basecamp(&self, basecamp: &Basecamp, user_id: &str) -> Result<Basecamp, ApiError> {
        let mut state = self.state.write().await;
        state.requests.push("set_basecamp".to_string());
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }

        basecamp.validate().map_err(rejection)?;
        let mut stored = basecamp.clone();
        stored.updated_by = Some(user_id.to_string());
        stored.updated_at = Some(Utc::now());
        state.basecamps.insert(stored.trip_id.clone(), stored.clone());
        Ok(stored)
    }
}
