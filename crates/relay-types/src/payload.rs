//! # Event Payloads
//!
//! The closed set of structured records carried by events. Each registered
//! event name maps to exactly one [`PayloadKind`]; the bus rejects anything
//! else before a handler runs.
//!
//! Every variant has a stable human-readable [`Display`](fmt::Display) form
//! used in log lines.

use crate::layer::Layer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;
use uuid::Uuid;

// =============================================================================
// PAYLOAD RECORDS
// =============================================================================

/// A normalized input item (chat message, gift, super chat, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Message text.
    pub text: String,
    /// Platform-side user identifier.
    pub user_id: String,
    /// Display name of the author.
    pub user_name: String,
    /// Platform the message came from (`bilibili`, `console`, ...).
    pub platform: String,
    /// Relative importance in `0.0..=1.0`.
    pub importance: f32,
    /// Untouched source record, for providers that need platform detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl MessagePayload {
    /// Create a message with default importance.
    pub fn new(text: impl Into<String>, user_name: impl Into<String>) -> Self {
        let user_name = user_name.into();
        Self {
            text: text.into(),
            user_id: user_name.clone(),
            user_name,
            platform: "unknown".to_string(),
            importance: 0.5,
            raw: None,
        }
    }

    /// Set the platform.
    #[must_use]
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }
}

/// A side effect requested alongside an intent (expression, hotkey, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentAction {
    /// Action type (`expression`, `hotkey`, `motion`).
    pub kind: String,
    /// Free-form parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// What the decision layer wants rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentPayload {
    /// Text to speak / display.
    pub text: String,
    /// Optional emotion label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    /// Extra actions for renderers.
    #[serde(default)]
    pub actions: Vec<IntentAction>,
    /// Id of the event this intent answers, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
}

impl IntentPayload {
    /// An intent with only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            emotion: None,
            actions: Vec::new(),
            reply_to: None,
        }
    }
}

/// An output provider finished rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderCompletedPayload {
    /// Provider that rendered.
    pub provider: String,
    /// Text of the rendered intent.
    pub text: String,
    /// Wall time spent rendering, in milliseconds.
    pub elapsed_ms: u64,
}

/// Connection state change of a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderStatusPayload {
    /// Provider name.
    pub provider: String,
    /// Provider layer.
    pub layer: Layer,
    /// Human-readable detail.
    pub detail: String,
}

/// A provider failed to handle an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePayload {
    /// Provider that failed.
    pub provider: String,
    /// Error description.
    pub error: String,
    /// Id of the event that could not be handled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
}

// =============================================================================
// PAYLOAD ENUM
// =============================================================================

/// Discriminant of [`Payload`], used by the schema registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadKind {
    /// [`MessagePayload`]
    Message,
    /// [`IntentPayload`]
    Intent,
    /// [`RenderCompletedPayload`]
    RenderCompleted,
    /// [`ProviderStatusPayload`]
    ProviderStatus,
    /// [`FailurePayload`]
    Failure,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Message => "Message",
            Self::Intent => "Intent",
            Self::RenderCompleted => "RenderCompleted",
            Self::ProviderStatus => "ProviderStatus",
            Self::Failure => "Failure",
        };
        f.write_str(name)
    }
}

/// Data attached to one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Payload {
    /// Normalized input item.
    Message(MessagePayload),
    /// Decision result.
    Intent(IntentPayload),
    /// Render finished.
    RenderCompleted(RenderCompletedPayload),
    /// Provider connection state.
    ProviderStatus(ProviderStatusPayload),
    /// Provider failure.
    Failure(FailurePayload),
}

impl Payload {
    /// The discriminant of this payload.
    #[must_use]
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Message(_) => PayloadKind::Message,
            Self::Intent(_) => PayloadKind::Intent,
            Self::RenderCompleted(_) => PayloadKind::RenderCompleted,
            Self::ProviderStatus(_) => PayloadKind::ProviderStatus,
            Self::Failure(_) => PayloadKind::Failure,
        }
    }

    /// Borrow the message record, if this is one.
    #[must_use]
    pub fn as_message(&self) -> Option<&MessagePayload> {
        match self {
            Self::Message(m) => Some(m),
            _ => None,
        }
    }

    /// Borrow the intent record, if this is one.
    #[must_use]
    pub fn as_intent(&self) -> Option<&IntentPayload> {
        match self {
            Self::Intent(i) => Some(i),
            _ => None,
        }
    }
}

/// Truncate long text for log output.
fn preview(text: &str) -> String {
    const MAX: usize = 48;
    if text.chars().count() <= MAX {
        return text.to_string();
    }
    let cut: String = text.chars().take(MAX).collect();
    format!("{cut}…")
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(m) => write!(
                f,
                "[{}] {}: {}",
                m.platform,
                m.user_name,
                preview(&m.text)
            ),
            Self::Intent(i) => match &i.emotion {
                Some(emotion) => write!(
                    f,
                    "intent({emotion}) \"{}\" +{} actions",
                    preview(&i.text),
                    i.actions.len()
                ),
                None => write!(
                    f,
                    "intent \"{}\" +{} actions",
                    preview(&i.text),
                    i.actions.len()
                ),
            },
            Self::RenderCompleted(r) => write!(
                f,
                "{} rendered \"{}\" in {}ms",
                r.provider,
                preview(&r.text),
                r.elapsed_ms
            ),
            Self::ProviderStatus(s) => write!(f, "{}/{}: {}", s.layer, s.provider, s.detail),
            Self::Failure(e) => write!(f, "{} failed: {}", e.provider, e.error),
        }
    }
}

impl From<MessagePayload> for Payload {
    fn from(value: MessagePayload) -> Self {
        Self::Message(value)
    }
}

impl From<IntentPayload> for Payload {
    fn from(value: IntentPayload) -> Self {
        Self::Intent(value)
    }
}

impl From<RenderCompletedPayload> for Payload {
    fn from(value: RenderCompletedPayload) -> Self {
        Self::RenderCompleted(value)
    }
}

impl From<ProviderStatusPayload> for Payload {
    fn from(value: ProviderStatusPayload) -> Self {
        Self::ProviderStatus(value)
    }
}

impl From<FailurePayload> for Payload {
    fn from(value: FailurePayload) -> Self {
        Self::Failure(value)
    }
}

// =============================================================================
// EVENT
// =============================================================================

/// One emitted event, shared read-only by every subscriber of a dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique id of this emission.
    pub id: Uuid,
    /// Dotted event name.
    pub name: String,
    /// Typed data.
    pub payload: Payload,
    /// Component that emitted the event.
    pub source: String,
    /// Wall-clock emission time.
    pub timestamp: SystemTime,
}

impl Event {
    /// Stamp a new event.
    pub fn new(name: impl Into<String>, payload: Payload, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            payload,
            source: source.into(),
            timestamp: SystemTime::now(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> {}", self.name, self.source, self.payload)
    }
}
