//! # Operation Queue
//!
//! Durable FIFO of mutations attempted while the client was offline.
//!
//! ## Features
//!
//! - **Persistent Queue**: Operations are written to SQLite before the caller
//!   is told the action was queued, so they survive restarts
//! - **FIFO Replay**: Pending operations are handed out in insertion order
//! - **Status Tracking**: Pending, in-progress and failed operations
//! - **Cleanup**: Remove old failed operations
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use tripsync::client::local_db::LocalDatabase;
//! use tripsync::client::offline::queue::{OperationAction, OperationKind, OperationQueue};
//!
//! # async fn example() -> tripsync::client::local_db::Result<()> {
//! let db = Arc::new(LocalDatabase::in_memory().await?);
//! let queue = OperationQueue::new(db);
//!
//! let id = queue
//!     .queue_operation(
//!         OperationKind::PollVote,
//!         OperationAction::Update,
//!         "trip-1",
//!         json!({"option_ids": ["opt-1"]}),
//!         Some("poll-1".to_string()),
//!     )
//!     .await?;
//!
//! for op in queue.pending_operations().await? {
//!     // Execute operation...
//!     queue.complete_operation(&op.id).await?;
//! }
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::client::local_db::{LocalDatabase, Result};

/// What a queued operation does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    PollCreate,
    PollVote,
    PollRemoveVote,
    PollClose,
    PollDelete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::PollCreate => "poll_create",
            OperationKind::PollVote => "poll_vote",
            OperationKind::PollRemoveVote => "poll_remove_vote",
            OperationKind::PollClose => "poll_close",
            OperationKind::PollDelete => "poll_delete",
        }
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "poll_create" => Ok(OperationKind::PollCreate),
            "poll_vote" => Ok(OperationKind::PollVote),
            "poll_remove_vote" => Ok(OperationKind::PollRemoveVote),
            "poll_close" => Ok(OperationKind::PollClose),
            "poll_delete" => Ok(OperationKind::PollDelete),
            other => Err(format!("unknown operation kind '{}'", other)),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CRUD action of a queued operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationAction {
    Create,
    Update,
    Delete,
}

impl OperationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationAction::Create => "create",
            OperationAction::Update => "update",
            OperationAction::Delete => "delete",
        }
    }
}

impl FromStr for OperationAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "create" => Ok(OperationAction::Create),
            "update" => Ok(OperationAction::Update),
            "delete" => Ok(OperationAction::Delete),
            other => Err(format!("unknown operation action '{}'", other)),
        }
    }
}

/// Operation execution status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Waiting to be replayed
    Pending,
    /// Currently being replayed
    InProgress,
    /// Needs manual resolution
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::InProgress => "in_progress",
            OperationStatus::Failed => "failed",
        }
    }
}

impl FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OperationStatus::Pending),
            "in_progress" => Ok(OperationStatus::InProgress),
            "failed" => Ok(OperationStatus::Failed),
            other => Err(format!("unknown operation status '{}'", other)),
        }
    }
}

/// Queued operation with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub id: Uuid,
    pub kind: OperationKind,
    pub action: OperationAction,
    pub trip_id: String,
    /// Target entity; `None` for creates
    pub target_id: Option<String>,
    pub payload: serde_json::Value,
    pub status: OperationStatus,
    /// Number of replay attempts so far
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt: Option<DateTime<Utc>>,
    /// Error message from last failure
    pub last_error: Option<String>,
}

impl QueuedOperation {
    pub fn new(
        kind: OperationKind,
        action: OperationAction,
        trip_id: impl Into<String>,
        payload: serde_json::Value,
        target_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            action,
            trip_id: trip_id.into(),
            target_id,
            payload,
            status: OperationStatus::Pending,
            retry_count: 0,
            created_at: Utc::now(),
            last_attempt: None,
            last_error: None,
        }
    }
}

/// Durable operation queue for offline operations
#[derive(Debug, Clone)]
pub struct OperationQueue {
    db: Arc<LocalDatabase>,
}

impl OperationQueue {
    pub fn new(db: Arc<LocalDatabase>) -> Self {
        Self { db }
    }

    /// Record a pending mutation and return its operation id
    ///
    /// The row is committed before this returns. A storage failure is
    /// returned to the caller: the action must then be reported as failed
    /// rather than queued.
    pub async fn queue_operation(
        &self,
        kind: OperationKind,
        action: OperationAction,
        trip_id: &str,
        payload: serde_json::Value,
        target_id: Option<String>,
    ) -> Result<Uuid> {
        let operation = QueuedOperation::new(kind, action, trip_id, payload, target_id);
        self.db.insert_operation(&operation).await?;

        tracing::info!(
            operation_id = %operation.id,
            kind = %kind,
            trip_id,
            "Queued offline operation"
        );
        Ok(operation.id)
    }

    /// Operations awaiting replay, oldest first
    ///
    /// Operations left `in_progress` by an interrupted replay are included.
    pub async fn pending_operations(&self) -> Result<Vec<QueuedOperation>> {
        self.db
            .load_operations(&[OperationStatus::Pending, OperationStatus::InProgress])
            .await
    }

    /// Operations that need manual resolution
    pub async fn failed_operations(&self) -> Result<Vec<QueuedOperation>> {
        self.db.load_operations(&[OperationStatus::Failed]).await
    }

    pub async fn get_operation(&self, operation_id: &Uuid) -> Result<Option<QueuedOperation>> {
        self.db.get_operation(operation_id).await
    }

    /// Mark operation as in progress
    pub async fn start_operation(&self, operation_id: &Uuid) -> Result<()> {
        self.db
            .update_operation_status(operation_id, OperationStatus::InProgress, None, true)
            .await?;
        Ok(())
    }

    /// Remove a successfully replayed operation
    pub async fn complete_operation(&self, operation_id: &Uuid) -> Result<()> {
        self.db.delete_operation(operation_id).await?;
        tracing::debug!(operation_id = %operation_id, "Completed queued operation");
        Ok(())
    }

    /// Put an operation back to pending after a transient failure
    pub async fn record_retry(&self, operation_id: &Uuid, error: &str) -> Result<()> {
        self.db
            .update_operation_status(operation_id, OperationStatus::Pending, Some(error), false)
            .await?;
        Ok(())
    }

    /// Mark operation as failed; it stays queued for manual resolution
    pub async fn fail_operation(&self, operation_id: &Uuid, error: &str) -> Result<()> {
        self.db
            .update_operation_status(operation_id, OperationStatus::Failed, Some(error), false)
            .await?;
        tracing::warn!(operation_id = %operation_id, error, "Queued operation failed");
        Ok(())
    }

    /// Move a failed operation back into the replay queue
    pub async fn requeue(&self, operation_id: &Uuid) -> Result<bool> {
        self.db
            .update_operation_status(operation_id, OperationStatus::Pending, None, false)
            .await
    }

    /// Drop an operation without replaying it
    pub async fn discard(&self, operation_id: &Uuid) -> Result<bool> {
        self.db.delete_operation(operation_id).await
    }

    /// Get operation statistics
    pub async fn stats(&self) -> Result<QueueStats> {
        let pending = self.db.count_operations(OperationStatus::Pending).await?;
        let in_progress = self.db.count_operations(OperationStatus::InProgress).await?;
        let failed = self.db.count_operations(OperationStatus::Failed).await?;

        Ok(QueueStats {
            total_operations: pending + in_progress + failed,
            pending,
            in_progress,
            failed,
        })
    }

    /// Clean up failed operations older than `max_age`
    pub async fn cleanup_failed_operations(&self, max_age: chrono::Duration) -> Result<u64> {
        self.db
            .delete_failed_operations_before(Utc::now() - max_age)
            .await
    }
}

/// Queue statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    /// Total operations in queue
    pub total_operations: u64,
    /// Pending operations
    pub pending: u64,
    /// Operations in progress
    pub in_progress: u64,
    /// Operations awaiting manual resolution
    pub failed: u64,
}
