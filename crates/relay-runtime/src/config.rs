//! # Runtime Configuration
//!
//! Per-layer provider selection plus bus and reconnect settings.
//!
//! ```json
//! {
//!   "bus": { "strict": true, "cleanup_timeout_ms": 5000, "force_cleanup": true },
//!   "input":    { "providers": { "scripted": { "messages": ["hi"] } } },
//!   "decision": { "providers": { "echo": {} } },
//!   "output":   { "failure_policy": "continue", "providers": { "console": {} } }
//! }
//! ```
//!
//! Provider blobs are handed to the provider factory untouched.
//!
//! ## Environment Overrides
//!
//! - `RELAY_STRICT`: strict architectural validation (`true`/`1`)
//! - `RELAY_CLEANUP_TIMEOUT_MS`: bus cleanup deadline
//! - `RELAY_FORCE_CLEANUP`: cancel dispatches still running at the deadline

use crate::backoff::ReconnectPolicy;
use crate::error::RuntimeError;
use relay_types::{ConfigurationError, Layer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// What a layer manager does when one provider fails on an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and keep going with the other providers.
    #[default]
    Continue,
    /// Abort the fan-out for this event and report it as a handler failure.
    Stop,
    /// Silently discard the event for the failing provider.
    Drop,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Stop => write!(f, "stop"),
            Self::Drop => write!(f, "drop"),
        }
    }
}

/// Providers enabled for one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    /// Whether the layer runs at all.
    pub enabled: bool,
    /// Per-event failure handling.
    pub failure_policy: FailurePolicy,
    /// Provider name → provider config blob.
    pub providers: BTreeMap<String, serde_json::Value>,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_policy: FailurePolicy::Continue,
            providers: BTreeMap::new(),
        }
    }
}

impl LayerConfig {
    /// Enable `name` with `config`.
    #[must_use]
    pub fn with_provider(mut self, name: impl Into<String>, config: serde_json::Value) -> Self {
        self.providers.insert(name.into(), config);
        self
    }

    /// Set the failure policy.
    #[must_use]
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

/// Event bus settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Reject subscriptions from unknown domain tags.
    pub strict: bool,
    /// Deadline for in-flight dispatches at shutdown.
    pub cleanup_timeout_ms: u64,
    /// Cancel dispatches still running at the deadline.
    pub force_cleanup: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            strict: true,
            cleanup_timeout_ms: 5_000,
            force_cleanup: true,
        }
    }
}

impl BusConfig {
    /// Cleanup deadline as a duration.
    #[must_use]
    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_millis(self.cleanup_timeout_ms)
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Event bus settings.
    pub bus: BusConfig,
    /// Input reconnect schedule.
    pub reconnect: ReconnectPolicy,
    /// Input layer.
    pub input: LayerConfig,
    /// Decision layer.
    pub decision: LayerConfig,
    /// Output layer.
    pub output: LayerConfig,
    /// Named values handed to every provider context as dependencies.
    pub dependencies: BTreeMap<String, serde_json::Value>,
}

impl RuntimeConfig {
    /// Parse a JSON document. Missing sections take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, RuntimeError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Config for `layer`.
    #[must_use]
    pub fn layer(&self, layer: Layer) -> &LayerConfig {
        match layer {
            Layer::Input => &self.input,
            Layer::Decision => &self.decision,
            Layer::Output => &self.output,
        }
    }

    /// Mutable config for `layer`.
    pub fn layer_mut(&mut self, layer: Layer) -> &mut LayerConfig {
        match layer {
            Layer::Input => &mut self.input,
            Layer::Decision => &mut self.decision,
            Layer::Output => &mut self.output,
        }
    }

    /// Reject settings no layer can run with.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.bus.cleanup_timeout_ms == 0 {
            return Err(ConfigurationError::Invalid(
                "bus.cleanup_timeout_ms must be positive".to_string(),
            ));
        }
        if self.reconnect.factor.is_nan() || self.reconnect.factor < 1.0 {
            return Err(ConfigurationError::Invalid(
                "reconnect.factor must be at least 1.0".to_string(),
            ));
        }
        if self.reconnect.first_ms > self.reconnect.max_ms {
            return Err(ConfigurationError::Invalid(
                "reconnect.first_ms exceeds reconnect.max_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply `RELAY_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("RELAY_STRICT") {
            self.bus.strict = parse_flag(&value);
            info!(strict = self.bus.strict, "Override from RELAY_STRICT");
        }

        if let Some(value) = lookup("RELAY_CLEANUP_TIMEOUT_MS") {
            match value.parse::<u64>() {
                Ok(ms) if ms > 0 => self.bus.cleanup_timeout_ms = ms,
                _ => warn!(value = %value, "Ignoring invalid RELAY_CLEANUP_TIMEOUT_MS"),
            }
        }

        if let Some(value) = lookup("RELAY_FORCE_CLEANUP") {
            self.bus.force_cleanup = parse_flag(&value);
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
