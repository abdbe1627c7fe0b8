//! # Offline Support
//!
//! Offline-first building blocks used by the mutation services.
//!
//! ## Architecture
//!
//! - **Entity Cache**: last-known entity payloads, read while offline
//! - **Operation Queue**: durable FIFO of mutations attempted offline
//! - **Optimistic Updates**: query state changed ahead of confirmation, with
//!   snapshots for rollback
//! - **Reconciliation**: server state merged with still-queued changes
//! - **Retry Logic**: backoff for transient backend failures
//!
//! ## Key Components
//!
//! - `cache.rs`: best-effort entity cache
//! - `queue.rs`: operation queue
//! - `optimistic.rs`: query store and optimistic update tracking
//! - `reconciliation.rs`: overlay merging
//! - `retry.rs`: backoff strategies

pub mod cache;
pub mod optimistic;
pub mod queue;
pub mod reconciliation;
pub mod retry;

pub use cache::EntityCache;
pub use optimistic::{Identified, OptimisticManager, OptimisticUpdate, QueryStore};
pub use queue::{
    OperationAction, OperationKind, OperationQueue, OperationStatus, QueueStats, QueuedOperation,
};
pub use reconciliation::{ReconciliationManager, ReconciliationOutcome, ReconciliationResult};
pub use retry::{retry_with_backoff, BackoffStrategy, RetryPolicy};
