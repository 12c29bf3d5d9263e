//! Subscriber configuration.

use crate::error::StreamError;
use crate::DEFAULT_QUEUE_SIZE;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What `publish` does when a subscriber's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Wait for space in this subscriber's queue.
    #[default]
    Block,
    /// Discard the incoming chunk.
    DropNewest,
    /// Evict the oldest queued chunk and enqueue the incoming one.
    DropOldest,
    /// Reject the chunk and report an overflow to the producer.
    FailFast,
}

impl fmt::Display for BackpressurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block => write!(f, "block"),
            Self::DropNewest => write!(f, "drop_newest"),
            Self::DropOldest => write!(f, "drop_oldest"),
            Self::FailFast => write!(f, "fail_fast"),
        }
    }
}

/// Per-subscriber queue settings, fixed at subscribe time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
    /// Maximum queued chunks. Must be at least 1.
    pub queue_size: usize,
    /// Full-queue behaviour.
    pub backpressure: BackpressurePolicy,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            backpressure: BackpressurePolicy::default(),
        }
    }
}

impl SubscriberConfig {
    /// Create a config.
    #[must_use]
    pub fn new(queue_size: usize, backpressure: BackpressurePolicy) -> Self {
        Self {
            queue_size,
            backpressure,
        }
    }

    /// Reject unusable settings.
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.queue_size == 0 {
            return Err(StreamError::InvalidConfig(
                "queue_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
