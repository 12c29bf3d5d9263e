//! Output layer: renders `decision.intent.generated`.

use super::{apply_policy, fan_out, guarded, instantiate, ProviderReport, Slot, Verdict};
use crate::config::{FailurePolicy, LayerConfig};
use crate::provider::{Dependencies, OutputProvider, ProviderContext};
use crate::registry::{ProviderFactory, ProviderRegistry};
use async_trait::async_trait;
use parking_lot::Mutex;
use relay_bus::{BusError, EmitOptions, EventBus, EventHandler, SubscriptionHandle, SubscriptionSpec};
use relay_stream::StreamingChannel;
use relay_types::events::{DECISION_INTENT_GENERATED, OUTPUT_RENDER_COMPLETED, OUTPUT_RENDER_FAILED};
use relay_types::{
    BoxError, ConfigurationError, DomainTag, Event, FailurePayload, Layer, Payload, PayloadKind,
    ProviderErrorKind, ProviderLifecycleError, ProviderStatus, RenderCompletedPayload,
};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Owns the output providers and the layer's intent subscription.
pub struct OutputManager {
    slots: Arc<Vec<Arc<Slot<dyn OutputProvider>>>>,
    rejected: Vec<ProviderReport>,
    policy: FailurePolicy,
    subscription: Mutex<Option<(Arc<EventBus>, SubscriptionHandle)>>,
}

impl OutputManager {
    /// Instantiate the providers enabled in `config`.
    pub fn load(
        config: &LayerConfig,
        registry: &ProviderRegistry,
    ) -> Result<(Self, Vec<ProviderLifecycleError>), ConfigurationError> {
        let loaded = instantiate(Layer::Output, config, registry, |factory| match factory {
            ProviderFactory::Output(f) => Some(f),
            _ => None,
        })?;

        let manager = Self {
            slots: Arc::new(loaded.slots),
            rejected: loaded.rejected,
            policy: config.failure_policy,
            subscription: Mutex::new(None),
        };
        Ok((manager, loaded.errors))
    }

    /// Run every provider's `setup`, then subscribe the layer to
    /// `decision.intent.generated`.
    pub async fn setup_all(
        &self,
        bus: &Arc<EventBus>,
        stream: &Arc<StreamingChannel>,
        dependencies: &Arc<Dependencies>,
        timeout: Duration,
    ) -> Result<Vec<ProviderLifecycleError>, BusError> {
        let mut errors = Vec::new();

        for slot in self.slots.iter() {
            info!("[OutputManager] Setting up '{}'", slot.name);
            let ctx = ProviderContext::new(
                slot.name.clone(),
                Layer::Output,
                Arc::clone(bus),
                Arc::clone(stream),
                Arc::clone(dependencies),
            );
            let outcome = guarded(Some(timeout), slot.provider.setup(&ctx)).await;
            slot.attach(ctx);

            if let Err(message) = outcome {
                error!(provider = %slot.name, error = %message, "Output provider setup failed");
                slot.record_failure(message.clone());
                slot.set_status(ProviderStatus::Failed);
                errors.push(slot.error(ProviderErrorKind::Setup, message));
            } else {
                slot.set_status(ProviderStatus::Running);
            }
        }

        let handle = bus.on(
            SubscriptionSpec::new(DECISION_INTENT_GENERATED)
                .expecting(PayloadKind::Intent)
                .domain(DomainTag::for_layer(Layer::Output)),
            Arc::new(RenderFanOut {
                slots: Arc::clone(&self.slots),
                policy: self.policy,
                bus: Arc::downgrade(bus),
            }),
        )?;
        *self.subscription.lock() = Some((Arc::clone(bus), handle));

        Ok(errors)
    }

    /// Drop the layer subscription, then clean up each provider in isolation.
    pub async fn cleanup_all(&self, timeout: Duration) -> Vec<ProviderLifecycleError> {
        if let Some((bus, handle)) = self.subscription.lock().take() {
            bus.off(&handle);
        }
        super::cleanup_slots(&self.slots, timeout, |provider| async move {
            provider.cleanup().await
        })
        .await
    }

    /// Status and counters for every configured provider.
    #[must_use]
    pub fn reports(&self) -> Vec<ProviderReport> {
        self.slots
            .iter()
            .map(|slot| slot.report())
            .chain(self.rejected.iter().cloned())
            .collect()
    }

    /// Loaded providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no provider loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

struct RenderFanOut {
    slots: Arc<Vec<Arc<Slot<dyn OutputProvider>>>>,
    policy: FailurePolicy,
    bus: Weak<EventBus>,
}

async fn publish(bus: &EventBus, name: &str, payload: impl Into<Payload>, source: &str) {
    if let Err(e) = bus.emit(name, payload, source, EmitOptions::default()).await {
        debug!(provider = source, event = name, error = %e, "Render outcome not emitted");
    }
}

/// Render one intent on one provider and report the outcome.
///
/// Returns `Err` only when the failure policy aborts the fan-out.
async fn render_one(
    slot: Arc<Slot<dyn OutputProvider>>,
    bus: Arc<EventBus>,
    event: Arc<Event>,
    policy: FailurePolicy,
) -> Result<(), String> {
    let Some(intent) = event.payload.as_intent() else {
        return Ok(());
    };

    let started = Instant::now();
    let message = match guarded(None, slot.provider.render(intent)).await {
        Ok(()) => {
            slot.record_handled();
            let done = RenderCompletedPayload {
                provider: slot.name.clone(),
                text: intent.text.clone(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
            publish(&bus, OUTPUT_RENDER_COMPLETED, done, &slot.name).await;
            return Ok(());
        }
        Err(message) => message,
    };

    let verdict = apply_policy(policy, &slot, &event.name, &message);
    if verdict == Verdict::Skip {
        return Ok(());
    }
    let failure = FailurePayload {
        provider: slot.name.clone(),
        error: message.clone(),
        event_id: Some(event.id),
    };
    publish(&bus, OUTPUT_RENDER_FAILED, failure, &slot.name).await;

    if verdict == Verdict::Abort {
        warn!(provider = %slot.name, "[OutputManager] Cancelling remaining renderers");
        return Err(format!("output provider '{}' failed: {}", slot.name, message));
    }
    Ok(())
}

#[async_trait]
impl EventHandler for RenderFanOut {
    async fn handle(&self, event: Arc<Event>) -> Result<(), BoxError> {
        if event.payload.as_intent().is_none() {
            return Err(format!("'{}' does not carry an intent", event.name).into());
        }
        let Some(bus) = self.bus.upgrade() else {
            return Ok(());
        };

        let policy = self.policy;
        fan_out(&self.slots, |slot| {
            render_one(slot, Arc::clone(&bus), Arc::clone(&event), policy)
        })
        .await
        .map_err(Into::into)
    }
}
