//! Integration tests for the client sync layer

pub mod basecamp;
pub mod offline_sync;
pub mod replay;
