//! # Provider Contracts
//!
//! The three provider shapes, one per layer.
//!
//! | Layer | Trait | Driven by |
//! |-------|-------|-----------|
//! | input | [`InputProvider`] | a pump that pulls `stream()` and emits each item |
//! | decision | [`DecisionProvider`] | fan-out of `input.message.ready` to `decide` |
//! | output | [`OutputProvider`] | fan-out of `decision.intent.generated` to `render` |
//!
//! Providers never construct the bus or the streaming channel; both are
//! handed to them through [`ProviderContext`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use relay_bus::{BusError, EmitOptions, EmitReceipt, EventBus, EventHandler, SubscriptionHandle, SubscriptionSpec};
use relay_stream::StreamingChannel;
use relay_types::{BoxError, DomainTag, IntentPayload, Layer, MessagePayload, Payload, PayloadKind};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

// =============================================================================
// RAW INPUT
// =============================================================================

/// An item as produced by an input provider, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawItem {
    /// Already normalized.
    Message(MessagePayload),
    /// Plain text from a named user.
    Text { user: String, text: String },
    /// Platform record; `text`, `user_name`, `user_id` and `importance` are
    /// picked out, the rest is kept as `raw`.
    Json(serde_json::Value),
}

/// Lazy item sequence returned by [`InputProvider::stream`].
pub type InputStream = BoxStream<'static, Result<RawItem, BoxError>>;

// =============================================================================
// PROVIDER TRAITS
// =============================================================================

/// Produces raw items from an external source.
#[async_trait]
pub trait InputProvider: Send + Sync + 'static {
    /// Open (or reopen after a disconnect) the item sequence.
    async fn stream(&self) -> Result<InputStream, BoxError>;

    /// Release resources.
    async fn cleanup(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Turns input messages into intents.
#[async_trait]
pub trait DecisionProvider: Send + Sync + 'static {
    /// Register extra subscriptions or warm up clients.
    async fn setup(&self, _ctx: &ProviderContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// Decide how to answer `message`. `None` means stay silent.
    async fn decide(&self, message: &MessagePayload) -> Result<Option<IntentPayload>, BoxError>;

    /// Release resources.
    async fn cleanup(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Renders intents.
#[async_trait]
pub trait OutputProvider: Send + Sync + 'static {
    /// Register extra subscriptions or connect to the device.
    async fn setup(&self, _ctx: &ProviderContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// Render one intent.
    async fn render(&self, intent: &IntentPayload) -> Result<(), BoxError>;

    /// Release resources.
    async fn cleanup(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

// =============================================================================
// DEPENDENCIES
// =============================================================================

/// Shared values injected into every provider context.
///
/// Config values come from [`RuntimeConfig::dependencies`]; resources are
/// arbitrary typed objects inserted by the embedding application.
///
/// [`RuntimeConfig::dependencies`]: crate::RuntimeConfig::dependencies
#[derive(Default, Clone)]
pub struct Dependencies {
    values: BTreeMap<String, serde_json::Value>,
    resources: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Dependencies {
    /// Dependencies holding only config values.
    #[must_use]
    pub fn from_values(values: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            values,
            resources: HashMap::new(),
        }
    }

    /// Add a typed resource.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, resource: Arc<T>) {
        self.resources.insert(key.into(), resource);
    }

    /// Config value by key.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Typed resource by key; `None` if missing or of another type.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.resources
            .get(key)
            .cloned()
            .and_then(|resource| resource.downcast::<T>().ok())
    }
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependencies")
            .field("values", &self.values.keys().collect::<Vec<_>>())
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .finish()
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Everything a provider may touch during `setup`.
///
/// Subscriptions made through the context carry the provider's own domain
/// tag and are removed by the manager at cleanup.
#[derive(Clone)]
pub struct ProviderContext {
    name: String,
    layer: Layer,
    bus: Arc<EventBus>,
    stream: Arc<StreamingChannel>,
    dependencies: Arc<Dependencies>,
    subscriptions: Arc<Mutex<Vec<SubscriptionHandle>>>,
}

impl ProviderContext {
    /// Build a context for one provider.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        layer: Layer,
        bus: Arc<EventBus>,
        stream: Arc<StreamingChannel>,
        dependencies: Arc<Dependencies>,
    ) -> Self {
        Self {
            name: name.into(),
            layer,
            bus,
            stream,
            dependencies,
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Provider name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provider layer.
    #[must_use]
    pub fn layer(&self) -> Layer {
        self.layer
    }

    /// Tag presented to the architectural validator.
    #[must_use]
    pub fn domain_tag(&self) -> DomainTag {
        DomainTag::for_provider(self.layer, &self.name)
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

    /// Injected dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    /// Subscribe under this provider's domain tag.
    pub fn subscribe(
        &self,
        pattern: &str,
        payload_kind: Option<PayloadKind>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionHandle, BusError> {
        let mut spec = SubscriptionSpec::new(pattern).domain(self.domain_tag());
        spec.payload_kind = payload_kind;
        let handle = self.bus.on(spec, handler)?;
        self.subscriptions.lock().push(handle.clone());
        Ok(handle)
    }

    /// Emit with this provider as the source.
    pub async fn emit(
        &self,
        name: &str,
        payload: impl Into<Payload>,
    ) -> Result<EmitReceipt, BusError> {
        self.bus
            .emit(name, payload, &self.name, EmitOptions::default())
            .await
    }

    /// Remove every subscription made through this context.
    pub(crate) fn unsubscribe_all(&self) -> usize {
        let handles: Vec<_> = self.subscriptions.lock().drain(..).collect();
        handles.iter().filter(|h| self.bus.off(h)).count()
    }
}

impl std::fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContext")
            .field("name", &self.name)
            .field("layer", &self.layer)
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish()
    }
}
