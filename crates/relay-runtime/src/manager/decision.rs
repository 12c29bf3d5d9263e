//! Decision layer: turns `input.message.ready` into intents.

use super::{apply_policy, fan_out, guarded, instantiate, ProviderReport, Slot, Verdict};
use crate::config::{FailurePolicy, LayerConfig};
use crate::provider::{DecisionProvider, Dependencies, ProviderContext};
use crate::registry::{ProviderFactory, ProviderRegistry};
use async_trait::async_trait;
use parking_lot::Mutex;
use relay_bus::{EmitOptions, EventBus, EventHandler, SubscriptionHandle, SubscriptionSpec};
use relay_stream::StreamingChannel;
use relay_types::events::{DECISION_INTENT_GENERATED, DECISION_REQUEST_FAILED, INPUT_MESSAGE_READY};
use relay_types::{
    BoxError, ConfigurationError, DomainTag, Event, FailurePayload, Layer, PayloadKind,
    ProviderErrorKind, ProviderLifecycleError, ProviderStatus,
};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Owns the decision providers and the layer's `input.message.ready`
/// subscription.
pub struct DecisionManager {
    slots: Arc<Vec<Arc<Slot<dyn DecisionProvider>>>>,
    rejected: Vec<ProviderReport>,
    policy: FailurePolicy,
    subscription: Mutex<Option<(Arc<EventBus>, SubscriptionHandle)>>,
}

impl DecisionManager {
    /// Instantiate the providers enabled in `config`.
    pub fn load(
        config: &LayerConfig,
        registry: &ProviderRegistry,
    ) -> Result<(Self, Vec<ProviderLifecycleError>), ConfigurationError> {
        let loaded = instantiate(Layer::Decision, config, registry, |factory| match factory {
            ProviderFactory::Decision(f) => Some(f),
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
    /// `input.message.ready`.
    ///
    /// Setup failures are isolated and returned; the failed provider receives
    /// no events. An error is returned only if the layer subscription itself
    /// is refused.
    pub async fn setup_all(
        &self,
        bus: &Arc<EventBus>,
        stream: &Arc<StreamingChannel>,
        dependencies: &Arc<Dependencies>,
        timeout: Duration,
    ) -> Result<Vec<ProviderLifecycleError>, relay_bus::BusError> {
        let mut errors = Vec::new();

        for slot in self.slots.iter() {
            info!("[DecisionManager] Setting up '{}'", slot.name);
            let ctx = ProviderContext::new(
                slot.name.clone(),
                Layer::Decision,
                Arc::clone(bus),
                Arc::clone(stream),
                Arc::clone(dependencies),
            );
            let outcome = guarded(Some(timeout), slot.provider.setup(&ctx)).await;
            slot.attach(ctx);

            match outcome {
                Ok(()) => slot.set_status(ProviderStatus::Running),
                Err(message) => {
                    error!(provider = %slot.name, error = %message, "Decision provider setup failed");
                    slot.record_failure(message.clone());
                    slot.set_status(ProviderStatus::Failed);
                    errors.push(slot.error(ProviderErrorKind::Setup, message));
                }
            }
        }

        let handler = DecisionFanOut {
            slots: Arc::clone(&self.slots),
            policy: self.policy,
            bus: Arc::downgrade(bus),
        };
        let handle = bus.on(
            SubscriptionSpec::new(INPUT_MESSAGE_READY)
                .expecting(PayloadKind::Message)
                .domain(DomainTag::for_layer(Layer::Decision)),
            Arc::new(handler),
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

struct DecisionFanOut {
    slots: Arc<Vec<Arc<Slot<dyn DecisionProvider>>>>,
    policy: FailurePolicy,
    bus: Weak<EventBus>,
}

/// Run one message through one provider and emit the outcome.
///
/// Returns `Err` only when the failure policy aborts the fan-out.
async fn decide_one(
    slot: Arc<Slot<dyn DecisionProvider>>,
    bus: Arc<EventBus>,
    event: Arc<Event>,
    policy: FailurePolicy,
) -> Result<(), String> {
    let Some(message) = event.payload.as_message() else {
        return Ok(());
    };

    let error = match guarded(None, slot.provider.decide(message)).await {
        Ok(Some(mut intent)) => {
            slot.record_handled();
            intent.reply_to.get_or_insert(event.id);
            if let Err(e) = bus
                .emit(DECISION_INTENT_GENERATED, intent, &slot.name, EmitOptions::default())
                .await
            {
                warn!(provider = %slot.name, error = %e, "Intent not emitted");
            }
            return Ok(());
        }
        Ok(None) => {
            slot.record_handled();
            debug!(provider = %slot.name, "Decision provider stayed silent");
            return Ok(());
        }
        Err(error) => error,
    };

    let verdict = apply_policy(policy, &slot, &event.name, &error);
    if verdict == Verdict::Skip {
        return Ok(());
    }
    let failure = FailurePayload {
        provider: slot.name.clone(),
        error: error.clone(),
        event_id: Some(event.id),
    };
    if let Err(e) = bus
        .emit(DECISION_REQUEST_FAILED, failure, &slot.name, EmitOptions::default())
        .await
    {
        debug!(provider = %slot.name, error = %e, "Failure event not emitted");
    }

    if verdict == Verdict::Abort {
        return Err(format!("decision provider '{}' failed: {}", slot.name, error));
    }
    Ok(())
}

#[async_trait]
impl EventHandler for DecisionFanOut {
    async fn handle(&self, event: Arc<Event>) -> Result<(), BoxError> {
        if event.payload.as_message().is_none() {
            return Err(format!("'{}' does not carry a message", event.name).into());
        }
        let Some(bus) = self.bus.upgrade() else {
            return Ok(());
        };

        let policy = self.policy;
        fan_out(&self.slots, |slot| {
            decide_one(slot, Arc::clone(&bus), Arc::clone(&event), policy)
        })
        .await
        .map_err(Into::into)
    }
}
