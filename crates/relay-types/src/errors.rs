//! # Error Types
//!
//! The error taxonomy shared by every crate of the coordination layer.
//!
//! | Error | Raised by | Fatal to |
//! |-------|-----------|----------|
//! | [`ValidationError`] | `emit`, `on` | that call, no handler runs |
//! | [`ArchitecturalViolationError`] | `on` | that subscription |
//! | [`HandlerError`] | subscriber callbacks | isolated unless opted out |
//! | [`BackpressureOverflowError`] | `publish` under fail-fast | that chunk |
//! | [`ProviderLifecycleError`] | provider setup/cleanup | that provider only |
//! | [`ConfigurationError`] | startup registration | startup |

use crate::layer::{DomainTag, Layer};
use crate::payload::PayloadKind;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Boxed error returned by user callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Payload or event-name mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The name is not a `{layer}.{component}.{action}` triple.
    #[error("malformed event name or pattern: '{name}'")]
    MalformedName { name: String },

    /// No payload kind is registered for this name.
    #[error("event '{name}' is not registered")]
    UnknownEvent { name: String },

    /// The payload does not match the registered kind.
    #[error("event '{name}' expects {expected} payload, got {actual}")]
    PayloadMismatch {
        name: String,
        expected: PayloadKind,
        actual: PayloadKind,
    },
}

/// A subscription would break the layered topology.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("architectural violation: {} may not subscribe to '{pattern}': {reason}", display_tag(.domain_tag))]
pub struct ArchitecturalViolationError {
    /// Tag presented by the subscriber (`None` when missing).
    pub domain_tag: Option<DomainTag>,
    /// Requested pattern.
    pub pattern: String,
    /// Why the request was refused.
    pub reason: String,
}

fn display_tag(tag: &Option<DomainTag>) -> String {
    match tag {
        Some(tag) => format!("'{tag}'"),
        None => "<untagged subscriber>".to_string(),
    }
}

/// A subscriber callback failed (returned an error or panicked).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler #{subscription_id} ({label}) failed on '{event}': {message}")]
pub struct HandlerError {
    /// Event being dispatched.
    pub event: String,
    /// Id of the event instance.
    pub event_id: Uuid,
    /// Subscription that failed.
    pub subscription_id: u64,
    /// Subscriber label (domain tag or pattern).
    pub label: String,
    /// Error text.
    pub message: String,
    /// Whether the handler panicked rather than returning an error.
    pub panicked: bool,
}

/// A fail-fast subscriber queue was full.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("backpressure overflow: chunk {sequence} rejected by {subscribers:?}")]
pub struct BackpressureOverflowError {
    /// Sequence number of the rejected chunk.
    pub sequence: u64,
    /// Subscribers whose queue was full.
    pub subscribers: Vec<String>,
}

/// Categories of provider lifecycle failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    /// The constructor rejected its configuration.
    Configuration,
    /// `setup` / start failed.
    Setup,
    /// The provider failed while handling an event or producing items.
    Runtime,
    /// `cleanup` / stop failed.
    Cleanup,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Setup => write!(f, "Setup"),
            Self::Runtime => write!(f, "Runtime"),
            Self::Cleanup => write!(f, "Cleanup"),
        }
    }
}

/// A provider failed one lifecycle step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{layer}/{provider}] {kind}: {message}")]
pub struct ProviderLifecycleError {
    /// Layer of the provider.
    pub layer: Layer,
    /// Provider name.
    pub provider: String,
    /// Failed step.
    pub kind: ProviderErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl ProviderLifecycleError {
    /// Build an error for `provider`.
    pub fn new(
        layer: Layer,
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl fmt::Display,
    ) -> Self {
        Self {
            layer,
            provider: provider.into(),
            kind,
            message: message.to_string(),
        }
    }
}

/// Startup-time configuration mistakes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Same event name registered with two payload kinds.
    #[error("event '{name}' already registered as {existing}, refusing {requested}")]
    ConflictingSchema {
        name: String,
        existing: PayloadKind,
        requested: PayloadKind,
    },

    /// Typed subscription does not match the registry.
    #[error("subscription to '{pattern}' declares {declared} but registry has {registered} for '{name}'")]
    SubscriptionTypeMismatch {
        pattern: String,
        name: String,
        declared: PayloadKind,
        registered: PayloadKind,
    },

    /// Two descriptors with the same layer and name.
    #[error("provider '{name}' already registered in layer {layer}")]
    DuplicateProvider { layer: Layer, name: String },

    /// Configuration enables a provider nobody registered.
    #[error("provider '{name}' is enabled for layer {layer} but not registered")]
    UnknownProvider { layer: Layer, name: String },

    /// Descriptor asks for subscriptions its layer may not hold.
    #[error("provider '{name}' requests '{pattern}', outside what layer {layer} may subscribe to")]
    DescriptorOutsideLayer {
        layer: Layer,
        name: String,
        pattern: String,
    },

    /// Any other invalid setting.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
