//! Reconnection Policy
//!
//! Deterministic exponential backoff for upstream reconnection:
//! `delay(attempt) = min(max_delay, initial_delay × 2^attempt)`.
//!
//! There is no jitter and no attempt cap: the delay law is part of the
//! gateway's observable contract (it is what operators see in the
//! logs and what the tests pin down), and retries continue until the
//! intent flag is cleared or the provider reports a fatal limit.

use std::time::Duration;

/// Configuration for reconnection backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Ceiling for the doubled delay.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Compute the backoff delay for a given attempt number.
#[must_use]
pub fn backoff_delay(config: &ReconnectConfig, attempt: u32) -> Duration {
    let initial_ms = u64::try_from(config.initial_delay.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(config.max_delay.as_millis()).unwrap_or(u64::MAX);

    let doubled = 1u64
        .checked_shl(attempt)
        .and_then(|factor| initial_ms.checked_mul(factor))
        .unwrap_or(u64::MAX);

    Duration::from_millis(doubled.min(max_ms))
}

/// Stateful backoff tracker for one connection loop.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use massive_stream_gateway::{ReconnectConfig, ReconnectPolicy};
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
///
/// assert_eq!(policy.next_delay(), Duration::from_millis(1000));
/// assert_eq!(policy.next_delay(), Duration::from_millis(2000));
///
/// // Successful authentication starts the ladder over.
/// policy.reset();
/// assert_eq!(policy.next_delay(), Duration::from_millis(1000));
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt: u32,
}

impl ReconnectPolicy {
    /// Create a new policy at attempt zero.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay for the current attempt; advances the attempt counter.
    #[must_use]
    pub fn next_delay(&mut self) -> Duration {
        let delay = backoff_delay(&self.config, self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Reset after a successful authentication.
    pub const fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of failed cycles since the last reset.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}
