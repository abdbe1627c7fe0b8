//! # State Reconciliation
//!
//! Merges server state with optimistic changes that are still waiting in the
//! offline queue. The server list is the base; each queued overlay is laid
//! on top in the order it was applied, so the newest local intent wins until
//! replay confirms or rejects it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tripsync::client::offline::ReconciliationManager;
//! use tripsync::shared::Poll;
//!
//! # fn example(server: Vec<Poll>, overlays: Vec<(String, Option<Poll>)>) {
//! let merged = ReconciliationManager::merge(server, &overlays);
//! # }
//! ```

use crate::client::offline::optimistic::Identified;

/// How a confirmed server value compares with the optimistic guess
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    /// Server agrees with the optimistic value
    Confirmed,
    /// Server state differs, usually because another client wrote meanwhile
    Diverged,
}

/// Result of merging a server list with queued overlays
#[derive(Debug, Clone)]
pub struct ReconciliationResult<T> {
    pub items: Vec<T>,
    /// Number of overlays applied on top of the server list
    pub overlaid: usize,
}

/// State reconciliation manager
#[derive(Debug, Default)]
pub struct ReconciliationManager;

impl ReconciliationManager {
    /// Lay queued overlays over a server list
    ///
    /// `Some` replaces the entity or inserts it at the front, `None` removes it.
    pub fn merge<T: Identified + Clone>(server: Vec<T>, overlays: &[(String, Option<T>)]) -> Vec<T> {
        Self::reconcile(server, overlays).items
    }

    pub fn reconcile<T: Identified + Clone>(
        server: Vec<T>,
        overlays: &[(String, Option<T>)],
    ) -> ReconciliationResult<T> {
        let mut items = server;
        for (entity_id, value) in overlays {
            let position = items.iter().position(|item| item.entity_id() == entity_id);
            match (value, position) {
                (Some(value), Some(index)) => items[index] = value.clone(),
                (Some(value), None) => items.insert(0, value.clone()),
                (None, Some(index)) => {
                    items.remove(index);
                }
                (None, None) => {}
            }
        }

        ReconciliationResult {
            items,
            overlaid: overlays.len(),
        }
    }

    /// Compare the optimistic guess with what the server confirmed
    pub fn compare<T: PartialEq>(optimistic: Option<&T>, confirmed: &T) -> ReconciliationOutcome {
        match optimistic {
            Some(guess) if guess == confirmed => ReconciliationOutcome::Confirmed,
            _ => ReconciliationOutcome::Diverged,
        }
    }
}
