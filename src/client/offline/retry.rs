//! # Retry Logic and Backoff Strategies
//!
//! Retry with backoff for requests that fail transiently, and the delay
//! schedule the background sync loop uses between failed replay passes.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tripsync::client::offline::retry::{retry_with_backoff, BackoffStrategy, RetryPolicy};
//!
//! # async fn example() -> Result<u32, String> {
//! let policy = RetryPolicy::new(
//!     BackoffStrategy::Exponential {
//!         base: Duration::from_millis(100),
//!         max: Duration::from_secs(5),
//!     },
//!     3,
//! );
//!
//! retry_with_backoff(&policy, |_e: &String| true, move || async move { Ok::<u32, String>(1) }).await
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use crate::shared::config::SyncSettings;

/// Backoff strategy configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Fixed interval between retries
    Fixed { interval: Duration },
    /// Doubling delay starting at `base`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl BackoffStrategy {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed { interval } => *interval,
            BackoffStrategy::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.saturating_mul(factor).min(*max)
            }
        }
    }
}

/// Attempt budget plus delay schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub strategy: BackoffStrategy,
    /// Total attempts, including the first one
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(strategy: BackoffStrategy, max_attempts: u32) -> Self {
        Self {
            strategy,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Read-retry policy from the sync settings
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(
            BackoffStrategy::Exponential {
                base: Duration::from_millis(settings.backoff_base_ms),
                max: Duration::from_millis(settings.backoff_max_ms),
            },
            settings.read_retry_attempts,
        )
    }

    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self::new(BackoffStrategy::Fixed { interval: Duration::ZERO }, 1)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.strategy.delay_for(attempt)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempt budget is spent
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    is_retryable: R,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && is_retryable(&e) => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(attempt, ?delay, error = %e, "Retrying after transient error");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
