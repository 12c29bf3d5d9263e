//! Input provider replaying a fixed script.

use crate::provider::{InputProvider, InputStream, RawItem};
use async_trait::async_trait;
use futures::StreamExt;
use relay_types::BoxError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One scripted line: plain text, or text with an explicit author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptedLine {
    /// Text from the default user.
    Text(String),
    /// Text from a named user.
    From { user: String, text: String },
}

/// Config blob of the `scripted` provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptedConfig {
    /// Lines to emit, in order.
    pub messages: Vec<ScriptedLine>,
    /// Author of plain-text lines.
    pub user: String,
    /// Pause before each line, in milliseconds.
    pub interval_ms: u64,
    /// Keep the stream open after the last line instead of ending it, so a
    /// reconnect does not replay the script.
    pub hold_open: bool,
}

impl Default for ScriptedConfig {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            user: "viewer".to_string(),
            interval_ms: 0,
            hold_open: true,
        }
    }
}

/// Replays [`ScriptedConfig::messages`] on every connection.
#[derive(Debug, Clone)]
pub struct ScriptedInput {
    config: ScriptedConfig,
}

impl ScriptedInput {
    /// Build from a parsed config.
    pub fn from_config(config: ScriptedConfig) -> Result<Self, BoxError> {
        if config.user.trim().is_empty() {
            return Err("scripted: `user` must not be empty".into());
        }
        Ok(Self { config })
    }

    fn items(&self) -> Vec<RawItem> {
        self.config
            .messages
            .iter()
            .map(|line| match line {
                ScriptedLine::Text(text) => RawItem::Text {
                    user: self.config.user.clone(),
                    text: text.clone(),
                },
                ScriptedLine::From { user, text } => RawItem::Text {
                    user: user.clone(),
                    text: text.clone(),
                },
            })
            .collect()
    }
}

#[async_trait]
impl InputProvider for ScriptedInput {
    async fn stream(&self) -> Result<InputStream, BoxError> {
        let interval = Duration::from_millis(self.config.interval_ms);
        let lines = futures::stream::iter(self.items()).then(move |item| async move {
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            Ok::<_, BoxError>(item)
        });

        if self.config.hold_open {
            Ok(lines.chain(futures::stream::pending()).boxed())
        } else {
            Ok(lines.boxed())
        }
    }
}
