//! # Reconnect Backoff
//!
//! Delay schedule used when an input provider's stream ends or fails.
//!
//! The delay for attempt `n` is `first × factor^n`, clamped to `max`. Each
//! attempt derives its delay from the attempt number alone.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconnect schedule for input pumps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect, in milliseconds.
    pub first_ms: u64,
    /// Upper bound on any delay, in milliseconds.
    pub max_ms: u64,
    /// Growth factor per attempt.
    pub factor: f64,
    /// Give up after this many consecutive failed attempts (`None` = never).
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            first_ms: 500,
            max_ms: 30_000,
            factor: 2.0,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (0-indexed).
    #[must_use]
    pub fn next(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let ms = self.first_ms as f64 * self.factor.powi(exp);

        if !ms.is_finite() || ms < 0.0 || ms > self.max_ms as f64 {
            Duration::from_millis(self.max_ms)
        } else {
            Duration::from_millis(ms.round() as u64)
        }
    }

    /// Whether `attempt` consecutive failures exhaust the policy.
    #[must_use]
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}
