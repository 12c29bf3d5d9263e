//! # Application Root
//!
//! [`Runtime`] owns the one [`EventBus`], the one [`StreamingChannel`] and the
//! three layer managers. Nothing in the workspace reaches for a global: every
//! component receives the `Arc`s it needs from here.
//!
//! ## Lifecycle
//!
//! ```text
//! start():    load all layers ──► rules ──► output ──► decision ──► input
//! shutdown(): input ──► decision ──► output ──► bus.cleanup ──► stream.close
//! ```
//!
//! Layers start bottom-up so no event is emitted before its consumers exist,
//! and stop top-down so no producer outlives its consumers.

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::manager::{DecisionManager, InputManager, OutputManager, ProviderReport};
use crate::provider::Dependencies;
use crate::registry::ProviderRegistry;
use relay_bus::{CleanupReport, EventBus, ValidationMode};
use relay_stream::StreamingChannel;
use relay_types::{DomainTag, Layer, ProviderLifecycleError};
use std::any::Any;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Where the runtime is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Constructed, `start` not yet called.
    Idle,
    /// Providers are running.
    Running,
    /// `shutdown` completed.
    Stopped,
}

/// What `shutdown` did.
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    /// Cleanup failures, isolated per provider.
    pub provider_errors: Vec<ProviderLifecycleError>,
    /// Event bus drain outcome.
    pub bus: CleanupReport,
    /// Every stream delivery task finished before the deadline.
    pub stream_drained: bool,
}

impl ShutdownReport {
    /// Whether everything shut down without failures or cancellations.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.provider_errors.is_empty() && self.bus.drained && self.stream_drained
    }
}

struct Layers {
    input: InputManager,
    decision: DecisionManager,
    output: OutputManager,
}

/// The coordination layer, assembled.
pub struct Runtime {
    config: RuntimeConfig,
    registry: Arc<ProviderRegistry>,
    bus: Arc<EventBus>,
    stream: Arc<StreamingChannel>,
    dependencies: Dependencies,
    layers: Option<Layers>,
    state: RuntimeState,
}

impl Runtime {
    /// Build the bus and the streaming channel for `config`.
    #[must_use]
    pub fn new(config: RuntimeConfig, registry: Arc<ProviderRegistry>) -> Self {
        let mode = if config.bus.strict {
            ValidationMode::Strict
        } else {
            ValidationMode::Permissive
        };
        let dependencies = Dependencies::from_values(config.dependencies.clone());

        Self {
            bus: Arc::new(EventBus::layered(mode)),
            stream: Arc::new(StreamingChannel::new()),
            config,
            registry,
            dependencies,
            layers: None,
            state: RuntimeState::Idle,
        }
    }

    /// Add a typed resource visible to every provider context.
    #[must_use]
    pub fn with_dependency<T: Any + Send + Sync>(mut self, key: impl Into<String>, resource: Arc<T>) -> Self {
        self.dependencies.insert(key, resource);
        self
    }

    /// The event bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The streaming channel.
    #[must_use]
    pub fn stream(&self) -> &Arc<StreamingChannel> {
        &self.stream
    }

    /// The effective configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RuntimeState {
        self.state
    }

    /// Status and counters of every configured provider, input first.
    #[must_use]
    pub fn reports(&self) -> Vec<ProviderReport> {
        self.layers.as_ref().map_or_else(Vec::new, |layers| {
            let mut reports = layers.input.reports();
            reports.extend(layers.decision.reports());
            reports.extend(layers.output.reports());
            reports
        })
    }

    /// Load and start every enabled layer.
    ///
    /// Provider failures are isolated and returned; the runtime keeps running
    /// with the providers that came up.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::InvalidState`] unless the runtime is idle.
    /// - [`RuntimeError::Configuration`] for unknown providers or invalid
    ///   settings. Nothing has started when this is returned.
    /// - [`RuntimeError::Bus`] if a layer subscription is refused. Layers
    ///   already set up are cleaned up first, and the runtime stays idle.
    pub async fn start(&mut self) -> Result<Vec<ProviderLifecycleError>, RuntimeError> {
        match self.state {
            RuntimeState::Idle => {}
            RuntimeState::Running => return Err(RuntimeError::InvalidState("already running")),
            RuntimeState::Stopped => return Err(RuntimeError::InvalidState("already stopped")),
        }
        self.config.validate()?;

        let (input, mut failures) =
            InputManager::load(&self.config.input, &self.registry, self.config.reconnect)?;
        let (decision, decision_failures) = DecisionManager::load(&self.config.decision, &self.registry)?;
        let (output, output_failures) = OutputManager::load(&self.config.output, &self.registry)?;
        failures.extend(decision_failures);
        failures.extend(output_failures);

        self.install_rules();

        let timeout = self.config.bus.cleanup_timeout();
        let dependencies = Arc::new(self.dependencies.clone());

        info!("[Runtime] Starting output layer ({} providers)", output.len());
        match output.setup_all(&self.bus, &self.stream, &dependencies, timeout).await {
            Ok(errors) => failures.extend(errors),
            Err(e) => {
                error!(error = %e, "[Runtime] Output layer refused, rolling back");
                output.cleanup_all(timeout).await;
                return Err(e.into());
            }
        }

        info!("[Runtime] Starting decision layer ({} providers)", decision.len());
        match decision.setup_all(&self.bus, &self.stream, &dependencies, timeout).await {
            Ok(errors) => failures.extend(errors),
            Err(e) => {
                error!(error = %e, "[Runtime] Decision layer refused, rolling back");
                decision.cleanup_all(timeout).await;
                output.cleanup_all(timeout).await;
                return Err(e.into());
            }
        }

        info!("[Runtime] Starting input layer ({} providers)", input.len());
        input.start_all(Arc::clone(&self.bus));

        for failure in &failures {
            error!(
                layer = %failure.layer,
                provider = %failure.provider,
                kind = %failure.kind,
                "[Runtime] Provider failed to start: {}", failure.message
            );
        }

        self.layers = Some(Layers {
            input,
            decision,
            output,
        });
        self.state = RuntimeState::Running;
        info!(
            failures = failures.len(),
            subscriptions = self.bus.subscription_count(),
            "[Runtime] Started"
        );
        Ok(failures)
    }

    /// Give each enabled provider its own subscription rule.
    fn install_rules(&self) {
        let validator = self.bus.validator();
        for layer in Layer::all() {
            let layer_config = self.config.layer(layer);
            if !layer_config.enabled {
                continue;
            }
            for name in layer_config.providers.keys() {
                if let Some(descriptor) = self.registry.get(layer, name) {
                    validator.set_rule(DomainTag::for_provider(layer, name), descriptor.subscription_rule());
                }
            }
        }
    }

    /// Stop every layer top-down, then drain the bus and the stream.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::InvalidState`] unless the runtime is running.
    pub async fn shutdown(&mut self) -> Result<ShutdownReport, RuntimeError> {
        if self.state != RuntimeState::Running {
            return Err(RuntimeError::InvalidState("not running"));
        }
        let Some(layers) = self.layers.as_ref() else {
            return Err(RuntimeError::InvalidState("not running"));
        };

        let timeout = self.config.bus.cleanup_timeout();
        info!("[Runtime] Shutting down (timeout {:?})", timeout);

        let mut provider_errors = layers.input.stop_all(timeout).await;
        provider_errors.extend(layers.decision.cleanup_all(timeout).await);
        provider_errors.extend(layers.output.cleanup_all(timeout).await);

        let bus = self.bus.cleanup(timeout, self.config.bus.force_cleanup).await;
        let stream_drained = self.stream.close(timeout).await;
        self.state = RuntimeState::Stopped;

        let report = ShutdownReport {
            provider_errors,
            bus,
            stream_drained,
        };
        if report.is_clean() {
            info!("[Runtime] Shutdown complete");
        } else {
            warn!(
                provider_errors = report.provider_errors.len(),
                bus_drained = report.bus.drained,
                cancelled = report.bus.cancelled,
                stream_drained,
                "[Runtime] Shutdown finished with problems"
            );
        }
        Ok(report)
    }
}
