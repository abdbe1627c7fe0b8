//! Property-based tests

pub mod poll_proptest;
