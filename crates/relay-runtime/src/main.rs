//! # relay
//!
//! Runs the coordination layer with the built-in providers.
//!
//! ## Startup Sequence
//!
//! 1. Install logging (`RELAY_LOG_LEVEL`, `RELAY_JSON_LOGS`)
//! 2. Load configuration from `RELAY_CONFIG` (JSON file) or the demo default
//! 3. Apply `RELAY_*` environment overrides
//! 4. Register the built-in providers and attach the audio meter
//! 5. Start output, decision and input layers
//! 6. Run until Ctrl+C, then shut down top-down

use std::sync::Arc;

use anyhow::{Context, Result};
use relay_runtime::builtin::AudioMeter;
use relay_runtime::{
    init_tracing, register_builtins, LayerConfig, ProviderRegistry, Runtime, RuntimeConfig,
    TelemetryConfig,
};
use relay_stream::{BackpressurePolicy, SubscriberConfig};
use serde_json::json;
use tracing::{info, warn};

/// Config used when `RELAY_CONFIG` is not set: a short script echoed to the
/// console and voiced as tones.
fn demo_config() -> RuntimeConfig {
    RuntimeConfig {
        input: LayerConfig::default().with_provider(
            "scripted",
            json!({
                "interval_ms": 750,
                "messages": [
                    "hello relay",
                    { "user": "mod", "text": "welcome to the stream" },
                    "what are you playing today?"
                ]
            }),
        ),
        decision: LayerConfig::default().with_provider("echo", json!({ "prefix": "> " })),
        output: LayerConfig::default()
            .with_provider("console", json!({}))
            .with_provider("tone", json!({ "frequency_hz": 523.25 })),
        ..RuntimeConfig::default()
    }
}

fn load_config() -> Result<RuntimeConfig> {
    let mut config = match std::env::var("RELAY_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {path}"))?;
            RuntimeConfig::from_json_str(&raw).with_context(|| format!("parsing config file {path}"))?
        }
        Err(_) => {
            info!("RELAY_CONFIG not set, using demo configuration");
            demo_config()
        }
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    init_tracing(&telemetry)?;

    let config = load_config()?;

    let registry = Arc::new(ProviderRegistry::new());
    register_builtins(&registry)?;

    let mut runtime = Runtime::new(config, registry);
    let meter = Arc::new(AudioMeter::new());
    runtime.stream().subscribe(
        "meter",
        meter.clone(),
        SubscriberConfig::new(32, BackpressurePolicy::DropOldest),
    )?;

    info!("===========================================");
    info!("  {} v{}", telemetry.service_name, env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    for failure in runtime.start().await? {
        warn!("Running without {}/{}: {}", failure.layer, failure.provider, failure.message);
    }

    info!("Relay is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    let report = runtime.shutdown().await?;
    for provider in runtime.reports() {
        info!(
            provider = %provider.name,
            layer = %provider.layer,
            status = %provider.status,
            handled = provider.handled,
            failed = provider.failed,
            "Provider summary"
        );
    }
    let reading = meter.reading();
    info!(sessions = reading.sessions, "Audio sessions metered");

    if !report.is_clean() {
        warn!(
            provider_errors = report.provider_errors.len(),
            cancelled = report.bus.cancelled,
            "Shutdown was not clean"
        );
    }
    Ok(())
}
