//! Shared Module
//!
//! Domain types and pure rules used by both the client sync layer and the
//! in-process demo backend. Nothing in here performs I/O.

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Entity keys and cached entity records
pub mod entity;

/// Votable polls
pub mod poll;

/// Trip basecamp location
pub mod basecamp;

/// Re-export commonly used types for convenience
pub use basecamp::Basecamp;
pub use config::{AppConfig, AppConfigBuilder, ConfigError, SyncSettings};
pub use entity::{CachedEntity, EntityKey, EntityType};
pub use error::SharedError;
pub use poll::{NewPoll, Poll, PollOption, PollStatus};
