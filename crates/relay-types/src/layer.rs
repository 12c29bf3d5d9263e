//! # Layers and Domain Tags
//!
//! The coordination layer is split into three provider groups. Data flows
//! strictly `Input -> Decision -> Output`.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// One of the three provider groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Produces raw items from external sources.
    Input,
    /// Turns input events into intents.
    Decision,
    /// Renders intents.
    Output,
}

impl Layer {
    /// The event-name segment owned by this layer.
    #[must_use]
    pub fn segment(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Decision => "decision",
            Self::Output => "output",
        }
    }

    /// Parse an event-name segment.
    #[must_use]
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "input" => Some(Self::Input),
            "decision" => Some(Self::Decision),
            "output" => Some(Self::Output),
            _ => None,
        }
    }

    /// The layer whose events this layer consumes.
    #[must_use]
    pub fn upstream(&self) -> Option<Layer> {
        match self {
            Self::Input => None,
            Self::Decision => Some(Self::Input),
            Self::Output => Some(Self::Decision),
        }
    }

    /// All layers in data-flow order.
    #[must_use]
    pub fn all() -> [Layer; 3] {
        [Self::Input, Self::Decision, Self::Output]
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// Identity a subscriber presents to the architectural validator.
///
/// Layer-wide tags are the layer segment (`"decision"`); provider tags are
/// `"{layer}:{provider}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DomainTag(Cow<'static, str>);

impl DomainTag {
    /// Create a tag from any string.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(Cow::Owned(tag.into()))
    }

    /// Create a tag from a static string without allocating.
    #[must_use]
    pub const fn from_static(tag: &'static str) -> Self {
        Self(Cow::Borrowed(tag))
    }

    /// Tag for a whole layer.
    #[must_use]
    pub fn for_layer(layer: Layer) -> Self {
        Self::from_static(layer.segment())
    }

    /// Tag for one provider inside a layer.
    #[must_use]
    pub fn for_provider(layer: Layer, provider: &str) -> Self {
        Self::new(format!("{}:{}", layer.segment(), provider))
    }

    /// The tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for DomainTag {
    fn from(tag: &'static str) -> Self {
        Self::from_static(tag)
    }
}
