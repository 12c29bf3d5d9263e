//! # Event Name Taxonomy
//!
//! Every event name is a dotted triple `{layer}.{component}.{action}`.
//! Call sites use the constants below rather than raw string literals.

use crate::errors::ValidationError;
use crate::layer::Layer;
use std::fmt;

// =============================================================================
// INPUT LAYER
// =============================================================================

/// A normalized message produced by an input provider.
pub const INPUT_MESSAGE_READY: &str = "input.message.ready";

/// An input provider (re)connected its source stream.
pub const INPUT_PROVIDER_CONNECTED: &str = "input.provider.connected";

/// An input provider lost its source stream.
pub const INPUT_PROVIDER_DISCONNECTED: &str = "input.provider.disconnected";

// =============================================================================
// DECISION LAYER
// =============================================================================

/// A decision provider produced an intent.
pub const DECISION_INTENT_GENERATED: &str = "decision.intent.generated";

/// A decision provider failed to handle a message.
pub const DECISION_REQUEST_FAILED: &str = "decision.request.failed";

// =============================================================================
// OUTPUT LAYER
// =============================================================================

/// An output provider finished rendering an intent.
pub const OUTPUT_RENDER_COMPLETED: &str = "output.render.completed";

/// An output provider failed to render an intent.
pub const OUTPUT_RENDER_FAILED: &str = "output.render.failed";

/// A validated three-part event name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventName {
    raw: String,
    dot_a: usize,
    dot_b: usize,
}

impl EventName {
    /// Parse and validate an event name.
    ///
    /// Segments must be non-empty and consist of `[a-z0-9_]`.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let malformed = || ValidationError::MalformedName {
            name: raw.to_string(),
        };

        let mut dots = raw.match_indices('.').map(|(i, _)| i);
        let (Some(dot_a), Some(dot_b), None) = (dots.next(), dots.next(), dots.next()) else {
            return Err(malformed());
        };

        let segments = [&raw[..dot_a], &raw[dot_a + 1..dot_b], &raw[dot_b + 1..]];
        let valid = segments.iter().all(|s| {
            !s.is_empty()
                && s.bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        });
        if !valid {
            return Err(malformed());
        }

        Ok(Self {
            raw: raw.to_string(),
            dot_a,
            dot_b,
        })
    }

    /// The full dotted name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// First segment (`input`, `decision`, `output`, ...).
    #[must_use]
    pub fn layer_segment(&self) -> &str {
        &self.raw[..self.dot_a]
    }

    /// Middle segment.
    #[must_use]
    pub fn component(&self) -> &str {
        &self.raw[self.dot_a + 1..self.dot_b]
    }

    /// Last segment.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.raw[self.dot_b + 1..]
    }

    /// The layer owning this name, if it is one of the three known layers.
    #[must_use]
    pub fn layer(&self) -> Option<Layer> {
        Layer::from_segment(self.layer_segment())
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
