//! # Built-in Providers
//!
//! Reference providers used by the `relay` binary and the integration suites.
//!
//! | Layer | Name | Does |
//! |-------|------|------|
//! | input | `scripted` | replays a fixed list of messages |
//! | decision | `echo` | answers every message with its own text |
//! | output | `console` | logs each intent |
//! | output | `tone` | voices each intent as a PCM tone on the streaming channel |
//!
//! [`AudioMeter`] is a stream subscriber measuring what `tone` produces.

mod console;
mod echo;
mod meter;
mod scripted;
mod tone;

pub use console::{ConsoleConfig, ConsoleOutput};
pub use echo::{EchoConfig, EchoDecision};
pub use meter::{AudioMeter, MeterReading};
pub use scripted::{ScriptedConfig, ScriptedInput, ScriptedLine};
pub use tone::{ToneConfig, ToneOutput};

use crate::registry::{ProviderDescriptor, ProviderRegistry};
use relay_types::events::DECISION_INTENT_GENERATED;
use relay_types::{BoxError, ConfigurationError, Pattern};
use serde::de::DeserializeOwned;

/// Parse a provider blob; `null` means "all defaults".
pub(crate) fn parse_config<T: DeserializeOwned + Default>(config: &serde_json::Value) -> Result<T, BoxError> {
    if config.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(config.clone())?)
}

/// Register every built-in provider.
pub fn register_builtins(registry: &ProviderRegistry) -> Result<(), ConfigurationError> {
    registry.register(ProviderDescriptor::input("scripted", |config| {
        ScriptedInput::from_config(parse_config(config)?)
    }))?;

    registry.register(ProviderDescriptor::decision("echo", |config| {
        Ok(EchoDecision::new(parse_config(config)?))
    }))?;

    registry.register(ProviderDescriptor::output("console", |config| {
        Ok(ConsoleOutput::new(parse_config(config)?))
    }))?;

    let intents = Pattern::parse(DECISION_INTENT_GENERATED)
        .map_err(|e| ConfigurationError::Invalid(e.to_string()))?;
    registry.register(
        ProviderDescriptor::output("tone", |config| ToneOutput::from_config(parse_config(config)?))
            .allow(vec![intents]),
    )?;

    Ok(())
}
