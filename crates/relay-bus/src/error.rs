//! # Bus Errors

use relay_types::{ArchitecturalViolationError, ConfigurationError, HandlerError, ValidationError};
use thiserror::Error;

/// Errors returned by [`EventBus`](crate::EventBus) and its registries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Event name or payload rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Subscription refused by the architectural validator.
    #[error(transparent)]
    Violation(#[from] ArchitecturalViolationError),

    /// A handler failed and the emit opted out of isolation.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// Startup-time misconfiguration.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The dispatch was cancelled by a forced cleanup.
    #[error("dispatch of '{event}' cancelled by bus shutdown")]
    Cancelled { event: String },

    /// The bus no longer accepts emits or subscriptions.
    #[error("event bus is shut down")]
    Closed,
}
