//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - An assembled client wired to the in-memory backend
//! - Poll fixtures with predictable option ids
//! - Custom assertion macros

#[macro_use]
pub mod assertions;
pub mod fixtures;

// Re-export commonly used utilities
pub use fixtures::*;
