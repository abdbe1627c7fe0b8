//! tripsync - Offline-First Sync for Trip Entities
//!
//! Client-side data layer that keeps collaborative trip entities usable
//! without a connection: reads come from a local cache when the backend is
//! unreachable, and changes are applied optimistically and replayed later.
//!
//! # Module Structure
//!
//! - **`shared`** - Domain types and pure rules
//!   - Polls and their vote transitions, basecamps
//!   - Entity keys, configuration, error types
//!
//! - **`client`** - The sync layer
//!   - Entity cache and offline queue over SQLite
//!   - Optimistic poll mutations with rollback and reconciliation
//!   - Online-only basecamp updates
//!   - Background replay driven by network status
//!
//! # Consistency
//!
//! Only poll votes (and the other poll changes) are allowed offline. They
//! carry the version they were computed against, and the backend rejects
//! stale versions so concurrent voters never lose each other's votes.
//! Basecamp changes are last-writer-wins and therefore refused offline.
//!
//! # Error Handling
//!
//! Mutations return [`client::error::MutationError`]; use
//! [`client::error::MutationError::kind`] to tell validation failures,
//! queued offline changes, conflicts and backend failures apart.

pub mod client;
pub mod shared;
