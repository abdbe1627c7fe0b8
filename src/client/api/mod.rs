//! # Backend API
//!
//! The `Backend` trait is the seam between the sync layer and the server.
//! Every mutating call on a versioned entity carries the version the client
//! last saw; the server rejects it with [`ApiError::Conflict`] when another
//! writer got there first and bumps the version by one when it accepts.
//!
//! ## Implementations
//!
//! - `http.rs`: REST/RPC client for the hosted backend
//! - `memory.rs`: in-process backend for demo mode and tests

pub mod http;
pub mod memory;

pub use http::HttpBackend;
pub use memory::MemoryBackend;

use async_trait::async_trait;
use thiserror::Error;

use crate::shared::basecamp::Basecamp;
use crate::shared::poll::Poll;

/// Errors returned by a backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The entity changed since the client read it
    #[error("Version conflict on {entity_id}: expected version {expected}")]
    Conflict {
        entity_id: String,
        expected: i64,
        current: Option<i64>,
    },

    /// The request never got a response
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not authenticated")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The server refused the request as invalid
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Errors worth retrying later without changing the request
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Server { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Conflict { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

/// Server operations on trip entities
#[async_trait]
pub trait Backend: Send + Sync {
    /// Polls of a trip, newest first
    async fn list_polls(&self, trip_id: &str) -> Result<Vec<Poll>, ApiError>;

    /// Store a poll created by the client; its id is client-generated
    async fn create_poll(&self, poll: &Poll) -> Result<Poll, ApiError>;

    /// Replace the user's selection with `option_ids` in one atomic write
    async fn vote_on_poll(
        &self,
        poll_id: &str,
        option_ids: &[String],
        user_id: &str,
        version: i64,
    ) -> Result<Poll, ApiError>;

    async fn remove_vote(&self, poll_id: &str, user_id: &str, version: i64) -> Result<Poll, ApiError>;

    async fn close_poll(&self, poll_id: &str, user_id: &str, version: i64) -> Result<Poll, ApiError>;

    async fn delete_poll(&self, poll_id: &str, user_id: &str) -> Result<(), ApiError>;

    async fn get_basecamp(&self, trip_id: &str) -> Result<Option<Basecamp>, ApiError>;

    async fn set_basecamp(&self, basecamp: &Basecamp, user_id: &str) -> Result<Basecamp, ApiError>;
}
