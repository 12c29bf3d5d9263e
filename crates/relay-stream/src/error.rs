//! # Stream Errors

use relay_types::BackpressureOverflowError;
use thiserror::Error;

/// Errors returned by [`StreamingChannel`](crate::StreamingChannel).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// One or more fail-fast subscribers rejected the chunk.
    #[error(transparent)]
    Overflow(#[from] BackpressureOverflowError),

    /// The channel was closed.
    #[error("streaming channel is closed")]
    Closed,

    /// A subscriber with this name already exists.
    #[error("stream subscriber '{name}' already registered")]
    DuplicateSubscriber { name: String },

    /// The subscriber configuration is unusable.
    #[error("invalid subscriber config: {0}")]
    InvalidConfig(String),
}
