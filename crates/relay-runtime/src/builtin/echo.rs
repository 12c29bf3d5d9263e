//! Decision provider answering each message with its own text.

use crate::provider::DecisionProvider;
use async_trait::async_trait;
use relay_types::{BoxError, IntentPayload, MessagePayload};
use serde::{Deserialize, Serialize};

/// Config blob of the `echo` provider.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoConfig {
    /// Prepended to every reply.
    pub prefix: String,
    /// Emotion attached to every intent.
    pub emotion: Option<String>,
    /// Messages below this importance get no reply.
    pub min_importance: f32,
}

/// Echoes messages back as intents.
#[derive(Debug, Clone)]
pub struct EchoDecision {
    config: EchoConfig,
}

impl EchoDecision {
    /// Build from a parsed config.
    #[must_use]
    pub fn new(config: EchoConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DecisionProvider for EchoDecision {
    async fn decide(&self, message: &MessagePayload) -> Result<Option<IntentPayload>, BoxError> {
        if message.importance < self.config.min_importance {
            return Ok(None);
        }
        let mut intent = IntentPayload::text(format!("{}{}", self.config.prefix, message.text));
        intent.emotion.clone_from(&self.config.emotion);
        Ok(Some(intent))
    }
}
