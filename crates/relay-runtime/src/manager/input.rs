//! Input layer: one pump per provider.
//!
//! ```text
//! stream() ──► items ──► normalize ──► emit input.message.ready
//!    ▲                                         │
//!    └──── backoff ◄── end / error ◄───────────┘
//! ```
//!
//! Items the bus refuses follow the layer's failure policy: `continue` logs
//! and keeps pumping, `drop` counts the item as dropped, `stop` marks the
//! provider failed and ends its pump.

use super::{guarded, instantiate, ProviderReport, Slot};
use crate::backoff::ReconnectPolicy;
use crate::config::{FailurePolicy, LayerConfig};
use crate::provider::{InputProvider, RawItem};
use crate::registry::{ProviderFactory, ProviderRegistry};
use futures::StreamExt;
use relay_bus::{BusError, EmitOptions, EventBus};
use relay_types::events::{INPUT_MESSAGE_READY, INPUT_PROVIDER_CONNECTED, INPUT_PROVIDER_DISCONNECTED};
use relay_types::{
    ConfigurationError, Layer, MessagePayload, ProviderLifecycleError, ProviderStatus,
    ProviderStatusPayload,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Owns the input providers and their pump tasks.
pub struct InputManager {
    slots: Vec<Arc<Slot<dyn InputProvider>>>,
    rejected: Vec<ProviderReport>,
    policy: FailurePolicy,
    reconnect: ReconnectPolicy,
    shutdown: CancellationToken,
    pumps: TaskTracker,
}

impl InputManager {
    /// Instantiate the providers enabled in `config`.
    ///
    /// Returns the manager plus the constructor failures, which are isolated.
    pub fn load(
        config: &LayerConfig,
        registry: &ProviderRegistry,
        reconnect: ReconnectPolicy,
    ) -> Result<(Self, Vec<ProviderLifecycleError>), ConfigurationError> {
        let loaded = instantiate(Layer::Input, config, registry, |factory| match factory {
            ProviderFactory::Input(f) => Some(f),
            _ => None,
        })?;

        let manager = Self {
            slots: loaded.slots,
            rejected: loaded.rejected,
            policy: config.failure_policy,
            reconnect,
            shutdown: CancellationToken::new(),
            pumps: TaskTracker::new(),
        };
        Ok((manager, loaded.errors))
    }

    /// Spawn one pump per provider. Returns the number of pumps started.
    pub fn start_all(&self, bus: Arc<EventBus>) -> usize {
        let mut started = 0;
        for slot in &self.slots {
            if slot.status() != ProviderStatus::Loaded {
                continue;
            }
            info!("[InputManager] Starting pump for '{}'", slot.name);
            slot.set_status(ProviderStatus::Running);
            self.pumps.spawn(pump(
                Arc::clone(slot),
                Arc::clone(&bus),
                self.policy,
                self.reconnect,
                self.shutdown.clone(),
            ));
            started += 1;
        }
        started
    }

    /// Cancel every pump, wait up to `timeout` for them, then clean up each
    /// provider in isolation.
    pub async fn stop_all(&self, timeout: Duration) -> Vec<ProviderLifecycleError> {
        self.shutdown.cancel();
        self.pumps.close();
        if tokio::time::timeout(timeout, self.pumps.wait()).await.is_err() {
            warn!(
                remaining = self.pumps.len(),
                "[InputManager] Pumps still running after {:?}", timeout
            );
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

/// Turn a raw item into a message payload.
///
/// JSON records need a string `text`; `user_name` (or `user`), `user_id`,
/// `platform` and `importance` are optional. `None` means the record carries
/// nothing to say.
#[must_use]
pub fn normalize(raw: RawItem, provider: &str) -> Option<MessagePayload> {
    match raw {
        RawItem::Message(mut message) => {
            if message.platform == "unknown" {
                message.platform = provider.to_string();
            }
            Some(message)
        }
        RawItem::Text { user, text } => {
            if text.trim().is_empty() {
                return None;
            }
            Some(MessagePayload::new(text, user).with_platform(provider))
        }
        RawItem::Json(value) => {
            let text = value.get("text").and_then(Value::as_str)?.to_string();
            if text.trim().is_empty() {
                return None;
            }
            let field = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);

            let user_name = field("user_name")
                .or_else(|| field("user"))
                .unwrap_or_else(|| "anonymous".to_string());
            let mut message = MessagePayload::new(text, user_name)
                .with_platform(field("platform").unwrap_or_else(|| provider.to_string()));
            if let Some(user_id) = field("user_id") {
                message.user_id = user_id;
            }
            if let Some(importance) = value.get("importance").and_then(Value::as_f64) {
                message.importance = importance.clamp(0.0, 1.0) as f32;
            }
            message.raw = Some(value);
            Some(message)
        }
    }
}

async fn announce(bus: &EventBus, slot: &Slot<dyn InputProvider>, name: &str, detail: &str) {
    let payload = ProviderStatusPayload {
        provider: slot.name.clone(),
        layer: Layer::Input,
        detail: detail.to_string(),
    };
    if let Err(e) = bus.emit(name, payload, &slot.name, EmitOptions::default()).await {
        debug!(provider = %slot.name, event = name, error = %e, "Status event not delivered");
    }
}

/// Drive one provider until cancelled, out of reconnect attempts, or
/// stopped by the failure policy.
async fn pump(
    slot: Arc<Slot<dyn InputProvider>>,
    bus: Arc<EventBus>,
    failure_policy: FailurePolicy,
    policy: ReconnectPolicy,
    shutdown: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        let opened = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            opened = guarded(None, slot.provider.stream()) => opened,
        };

        match opened {
            Ok(mut items) => {
                slot.set_status(ProviderStatus::Running);
                announce(&bus, &slot, INPUT_PROVIDER_CONNECTED, "stream opened").await;

                let mut delivered = false;
                let reason = loop {
                    let next = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => {
                            announce(&bus, &slot, INPUT_PROVIDER_DISCONNECTED, "shutdown").await;
                            return;
                        }
                        next = items.next() => next,
                    };

                    match next {
                        Some(Ok(raw)) => {
                            let Some(message) = normalize(raw, &slot.name) else {
                                slot.record_dropped();
                                debug!(provider = %slot.name, "Skipping empty input item");
                                continue;
                            };
                            match bus
                                .emit(INPUT_MESSAGE_READY, message, &slot.name, EmitOptions::default())
                                .await
                            {
                                Ok(_) => {
                                    slot.record_handled();
                                    delivered = true;
                                }
                                Err(BusError::Closed) => {
                                    debug!(provider = %slot.name, "Bus closed, pump exiting");
                                    return;
                                }
                                Err(e) => match failure_policy {
                                    FailurePolicy::Continue => {
                                        slot.record_failure(e.to_string());
                                        warn!(provider = %slot.name, error = %e, "Input item rejected by bus");
                                    }
                                    FailurePolicy::Drop => {
                                        slot.record_dropped();
                                        debug!(provider = %slot.name, error = %e, "Input item rejected by bus, dropped");
                                    }
                                    FailurePolicy::Stop => {
                                        slot.record_failure(e.to_string());
                                        error!(
                                            provider = %slot.name,
                                            error = %e,
                                            "[InputManager] Stopping '{}' after rejected item", slot.name
                                        );
                                        announce(&bus, &slot, INPUT_PROVIDER_DISCONNECTED, "stopped by failure policy").await;
                                        slot.set_status(ProviderStatus::Failed);
                                        return;
                                    }
                                },
                            }
                        }
                        Some(Err(e)) => {
                            slot.record_failure(e.to_string());
                            warn!(provider = %slot.name, error = %e, "Input stream failed");
                            break format!("stream error: {e}");
                        }
                        None => {
                            info!("[InputManager] Stream of '{}' ended", slot.name);
                            break "stream ended".to_string();
                        }
                    }
                };

                if delivered {
                    attempt = 0;
                }
                announce(&bus, &slot, INPUT_PROVIDER_DISCONNECTED, &reason).await;
            }
            Err(message) => {
                slot.record_failure(message.clone());
                warn!(provider = %slot.name, error = %message, "Failed to open input stream");
            }
        }

        if policy.exhausted(attempt) {
            error!(
                provider = %slot.name,
                attempts = attempt,
                "[InputManager] Giving up on '{}'", slot.name
            );
            slot.set_status(ProviderStatus::Failed);
            return;
        }

        let delay = policy.next(attempt);
        attempt = attempt.saturating_add(1);
        slot.record_reconnect();
        slot.set_status(ProviderStatus::Reconnecting);
        debug!(provider = %slot.name, attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InputStream;
    use crate::registry::ProviderDescriptor;
    use async_trait::async_trait;
    use relay_bus::{handler_fn, ArchitecturalValidator, PayloadRegistry, SubscriptionSpec, ValidationMode};
    use relay_types::BoxError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// Yields `items` on every connection, then ends.
    struct Replay {
        items: Vec<&'static str>,
        opened: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl InputProvider for Replay {
        async fn stream(&self) -> Result<InputStream, BoxError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let items: Vec<Result<RawItem, BoxError>> = self
                .items
                .iter()
                .map(|text| {
                    Ok(RawItem::Text {
                        user: "viewer".to_string(),
                        text: (*text).to_string(),
                    })
                })
                .collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    struct Broken;

    #[async_trait]
    impl InputProvider for Broken {
        async fn stream(&self) -> Result<InputStream, BoxError> {
            Err("device unplugged".into())
        }
    }

    fn fast_policy(max_attempts: Option<u32>) -> ReconnectPolicy {
        ReconnectPolicy {
            first_ms: 5,
            max_ms: 20,
            factor: 2.0,
            max_attempts,
        }
    }

    fn bus_with_listener() -> (Arc<EventBus>, mpsc::UnboundedReceiver<String>) {
        let bus = Arc::new(EventBus::layered(ValidationMode::Permissive));
        let (tx, rx) = mpsc::unbounded_channel();
        bus.on(
            SubscriptionSpec::new("input.*").domain(relay_types::DomainTag::for_layer(Layer::Decision)),
            handler_fn(move |event| {
                let _ = tx.send(event.name.clone());
                async { Ok(()) }
            }),
        )
        .unwrap();
        (bus, rx)
    }

    /// A bus that refuses every event, since its registry knows none.
    fn refusing_bus() -> Arc<EventBus> {
        Arc::new(EventBus::new(
            Arc::new(PayloadRegistry::new()),
            Arc::new(ArchitecturalValidator::layered(ValidationMode::Permissive)),
        ))
    }

    fn replay_manager(policy: FailurePolicy) -> InputManager {
        let registry = ProviderRegistry::new();
        registry
            .register(ProviderDescriptor::input("replay", |_| {
                Ok(Replay {
                    items: vec!["one", "two", "three"],
                    opened: Arc::new(AtomicUsize::new(0)),
                })
            }))
            .unwrap();
        let config = LayerConfig {
            failure_policy: policy,
            ..LayerConfig::default()
        }
        .with_provider("replay", serde_json::json!({}));
        let (manager, _) = InputManager::load(&config, &registry, fast_policy(Some(0))).unwrap();
        manager
    }

    async fn wait_for_status(manager: &InputManager, status: ProviderStatus) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while manager.reports()[0].status != status {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_normalize_variants() {
        let text = normalize(
            RawItem::Text {
                user: "alice".to_string(),
                text: "hello".to_string(),
            },
            "console",
        )
        .unwrap();
        assert_eq!(text.user_name, "alice");
        assert_eq!(text.platform, "console");

        let json = normalize(
            RawItem::Json(serde_json::json!({
                "text": "gift!",
                "user": "bob",
                "user_id": "42",
                "importance": 3.0,
                "coins": 100
            })),
            "bilibili",
        )
        .unwrap();
        assert_eq!(json.user_name, "bob");
        assert_eq!(json.user_id, "42");
        assert_eq!(json.platform, "bilibili");
        assert!((json.importance - 1.0).abs() < f32::EPSILON);
        assert_eq!(json.raw.unwrap()["coins"], 100);

        assert!(normalize(RawItem::Json(serde_json::json!({ "coins": 1 })), "x").is_none());
        assert!(normalize(
            RawItem::Text {
                user: "a".to_string(),
                text: "   ".to_string()
            },
            "x"
        )
        .is_none());
    }

    #[test]
    fn test_unknown_provider_is_configuration_error() {
        let registry = ProviderRegistry::new();
        let config = LayerConfig::default().with_provider("ghost", serde_json::json!({}));
        let err = InputManager::load(&config, &registry, ReconnectPolicy::default())
            .err()
            .unwrap();
        assert!(matches!(err, ConfigurationError::UnknownProvider { .. }));
    }

    #[test]
    fn test_constructor_failure_is_isolated() {
        let registry = ProviderRegistry::new();
        registry
            .register(ProviderDescriptor::input("bad", |_| Err::<Broken, _>("missing room id".into())))
            .unwrap();
        registry
            .register(ProviderDescriptor::input("good", |_| Ok(Broken)))
            .unwrap();

        let config = LayerConfig::default()
            .with_provider("bad", serde_json::json!({}))
            .with_provider("good", serde_json::json!({}));
        let (manager, errors) =
            InputManager::load(&config, &registry, ReconnectPolicy::default()).unwrap();

        assert_eq!(manager.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].provider, "bad");
        let bad = manager.reports().into_iter().find(|r| r.name == "bad").unwrap();
        assert_eq!(bad.status, ProviderStatus::Failed);
    }

    #[tokio::test]
    async fn test_pump_emits_and_reconnects() {
        let opened = Arc::new(AtomicUsize::new(0));
        let registry = ProviderRegistry::new();
        let counter = Arc::clone(&opened);
        registry
            .register(ProviderDescriptor::input("replay", move |_| {
                Ok(Replay {
                    items: vec!["one", "two"],
                    opened: Arc::clone(&counter),
                })
            }))
            .unwrap();

        let config = LayerConfig::default().with_provider("replay", serde_json::json!({}));
        let (manager, _) = InputManager::load(&config, &registry, fast_policy(None)).unwrap();
        let (bus, mut rx) = bus_with_listener();
        assert_eq!(manager.start_all(Arc::clone(&bus)), 1);

        let mut seen = Vec::new();
        while seen.iter().filter(|n| *n == INPUT_MESSAGE_READY).count() < 4 {
            let name = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            seen.push(name);
        }
        assert!(seen.contains(&INPUT_PROVIDER_CONNECTED.to_string()));
        assert!(seen.contains(&INPUT_PROVIDER_DISCONNECTED.to_string()));
        assert!(opened.load(Ordering::SeqCst) >= 2);

        let errors = manager.stop_all(Duration::from_secs(1)).await;
        assert!(errors.is_empty());
        let report = &manager.reports()[0];
        assert_eq!(report.status, ProviderStatus::Stopped);
        assert!(report.handled >= 4);
        assert!(report.reconnects >= 1);
    }

    #[tokio::test]
    async fn test_pump_gives_up_after_max_attempts() {
        let registry = ProviderRegistry::new();
        registry
            .register(ProviderDescriptor::input("broken", |_| Ok(Broken)))
            .unwrap();
        let config = LayerConfig::default().with_provider("broken", serde_json::json!({}));
        let (manager, _) = InputManager::load(&config, &registry, fast_policy(Some(2))).unwrap();
        let (bus, _rx) = bus_with_listener();
        manager.start_all(bus);

        tokio::time::timeout(Duration::from_secs(2), async {
            while manager.reports()[0].status != ProviderStatus::Failed {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let report = &manager.reports()[0];
        assert_eq!(report.failed, 3);
        assert_eq!(report.reconnects, 2);
        assert_eq!(report.last_error.as_deref(), Some("device unplugged"));
    }

    #[tokio::test]
    async fn test_drop_policy_counts_rejected_items_as_dropped() {
        let manager = replay_manager(FailurePolicy::Drop);
        manager.start_all(refusing_bus());
        wait_for_status(&manager, ProviderStatus::Failed).await;

        let report = &manager.reports()[0];
        assert_eq!(report.dropped, 3);
        assert_eq!(report.handled, 0);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_stop_policy_ends_pump_on_first_rejection() {
        let manager = replay_manager(FailurePolicy::Stop);
        manager.start_all(refusing_bus());
        wait_for_status(&manager, ProviderStatus::Failed).await;

        let report = &manager.reports()[0];
        assert_eq!(report.failed, 1);
        assert_eq!(report.dropped, 0);
        assert_eq!(report.reconnects, 0);
        assert!(report.last_error.as_deref().unwrap().contains("input.message.ready"));
    }

    #[tokio::test]
    async fn test_continue_policy_keeps_pumping_after_rejection() {
        let manager = replay_manager(FailurePolicy::Continue);
        manager.start_all(refusing_bus());
        wait_for_status(&manager, ProviderStatus::Failed).await;

        let report = &manager.reports()[0];
        assert_eq!(report.failed, 3);
        assert_eq!(report.dropped, 0);
    }
}
