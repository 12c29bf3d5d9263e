//! Output provider that logs intents.

use crate::provider::OutputProvider;
use async_trait::async_trait;
use relay_types::{BoxError, IntentPayload};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Config blob of the `console` provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Label printed before each line.
    pub label: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            label: "console".to_string(),
        }
    }
}

/// Writes each intent to the log.
#[derive(Debug)]
pub struct ConsoleOutput {
    config: ConsoleConfig,
    rendered: AtomicU64,
}

impl ConsoleOutput {
    /// Build from a parsed config.
    #[must_use]
    pub fn new(config: ConsoleConfig) -> Self {
        Self {
            config,
            rendered: AtomicU64::new(0),
        }
    }

    /// Intents rendered so far.
    #[must_use]
    pub fn rendered(&self) -> u64 {
        self.rendered.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OutputProvider for ConsoleOutput {
    async fn render(&self, intent: &IntentPayload) -> Result<(), BoxError> {
        let n = self.rendered.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            label = %self.config.label,
            n,
            emotion = intent.emotion.as_deref().unwrap_or("neutral"),
            "[{}] {}", self.config.label, intent.text
        );
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), BoxError> {
        info!("[{}] rendered {} intents", self.config.label, self.rendered());
        Ok(())
    }
}
