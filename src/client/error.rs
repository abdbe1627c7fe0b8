//! Mutation errors
//!
//! The result of a mutating action is one of four kinds. Callers branch on
//! [`MutationError::kind`] rather than on message text; an offline result is
//! not a failure, the change is queued and already visible locally.

use thiserror::Error;
use uuid::Uuid;

use crate::client::api::ApiError;
use crate::client::local_db::StoreError;
use crate::shared::entity::EntityKey;
use crate::shared::error::SharedError;

/// Error returned by a mutating action
#[derive(Debug, Error)]
pub enum MutationError {
    /// Rejected by the entity rules before any I/O
    #[error(transparent)]
    Validation(#[from] SharedError),

    /// No connectivity; the change was queued when `operation_id` is set
    #[error("OFFLINE: {message}")]
    Offline {
        operation_id: Option<Uuid>,
        message: String,
    },

    /// Another writer changed the entity first; local state was refreshed
    #[error("{entity} was updated elsewhere (expected version {expected})")]
    Conflict { entity: EntityKey, expected: i64 },

    /// The backend refused or failed the change; local state was rolled back
    #[error("Failed to {action}: {source}")]
    Failed {
        action: &'static str,
        #[source]
        source: ApiError,
    },

    /// The change could not be recorded locally
    #[error("Local storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Outcome category of a failed mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationErrorKind {
    Validation,
    Offline,
    Conflict,
    Failed,
}

impl MutationError {
    pub fn offline(operation_id: Option<Uuid>, message: impl Into<String>) -> Self {
        MutationError::Offline {
            operation_id,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> MutationErrorKind {
        match self {
            MutationError::Validation(_) => MutationErrorKind::Validation,
            MutationError::Offline { .. } => MutationErrorKind::Offline,
            MutationError::Conflict { .. } => MutationErrorKind::Conflict,
            MutationError::Failed { .. } | MutationError::Storage(_) => MutationErrorKind::Failed,
        }
    }

    pub fn is_offline(&self) -> bool {
        self.kind() == MutationErrorKind::Offline
    }

    /// Id of the queued operation, for offline results
    pub fn operation_id(&self) -> Option<Uuid> {
        match self {
            MutationError::Offline { operation_id, .. } => *operation_id,
            _ => None,
        }
    }
}
