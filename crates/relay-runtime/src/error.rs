//! # Runtime Errors

use relay_bus::BusError;
use relay_stream::StreamError;
use relay_types::{ConfigurationError, ProviderLifecycleError};
use thiserror::Error;

/// Errors surfaced by the runtime and its managers.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Event bus failure.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Streaming channel failure.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Startup misconfiguration.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A provider failed a lifecycle step.
    #[error(transparent)]
    Provider(#[from] ProviderLifecycleError),

    /// Configuration JSON could not be parsed.
    #[error("failed to parse runtime config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Logging could not be installed.
    #[error("failed to initialise tracing: {0}")]
    Telemetry(String),

    /// `start` was called twice, or `shutdown` before `start`.
    #[error("runtime is {0}")]
    InvalidState(&'static str),
}
