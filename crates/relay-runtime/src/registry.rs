//! # Provider Registry
//!
//! Static, builder-style registration of provider descriptors. Nothing is
//! discovered at runtime: the embedding application registers every provider
//! it links before the runtime starts.
//!
//! ```text
//! ProviderRegistry
//! ├── input
//! │   └── scripted  (factory: Input)
//! ├── decision
//! │   └── echo      (factory: Decision)
//! └── output
//!     ├── console   (factory: Output)
//!     └── tone      (factory: Output, allowed: [decision.intent.*])
//! ```

use crate::provider::{DecisionProvider, InputProvider, OutputProvider};
use parking_lot::RwLock;
use relay_bus::ArchitecturalValidator;
use relay_types::{BoxError, ConfigurationError, Layer, Pattern};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Constructor taking the provider's config blob.
pub type Factory<P> = Arc<dyn Fn(&serde_json::Value) -> Result<Arc<P>, BoxError> + Send + Sync>;

/// Layer-specific constructor. The variant decides the provider's layer.
#[derive(Clone)]
pub enum ProviderFactory {
    /// Builds an input provider.
    Input(Factory<dyn InputProvider>),
    /// Builds a decision provider.
    Decision(Factory<dyn DecisionProvider>),
    /// Builds an output provider.
    Output(Factory<dyn OutputProvider>),
}

impl ProviderFactory {
    /// Layer implied by the variant.
    #[must_use]
    pub fn layer(&self) -> Layer {
        match self {
            Self::Input(_) => Layer::Input,
            Self::Decision(_) => Layer::Decision,
            Self::Output(_) => Layer::Output,
        }
    }
}

impl fmt::Debug for ProviderFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProviderFactory::{}", self.layer())
    }
}

/// Static description of one provider.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    /// Name used in configuration.
    pub name: String,
    /// Where the provider comes from (`builtin`, crate name, ...).
    pub source: String,
    /// Constructor.
    pub factory: ProviderFactory,
    /// Narrower subscription rule for this provider; `None` inherits the layer's.
    pub allowed_patterns: Option<Vec<Pattern>>,
}

impl ProviderDescriptor {
    /// Describe an input provider.
    pub fn input<F, P>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&serde_json::Value) -> Result<P, BoxError> + Send + Sync + 'static,
        P: InputProvider,
    {
        Self::with_factory(
            name,
            ProviderFactory::Input(Arc::new(move |config| {
                factory(config).map(|p| Arc::new(p) as Arc<dyn InputProvider>)
            })),
        )
    }

    /// Describe a decision provider.
    pub fn decision<F, P>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&serde_json::Value) -> Result<P, BoxError> + Send + Sync + 'static,
        P: DecisionProvider,
    {
        Self::with_factory(
            name,
            ProviderFactory::Decision(Arc::new(move |config| {
                factory(config).map(|p| Arc::new(p) as Arc<dyn DecisionProvider>)
            })),
        )
    }

    /// Describe an output provider.
    pub fn output<F, P>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&serde_json::Value) -> Result<P, BoxError> + Send + Sync + 'static,
        P: OutputProvider,
    {
        Self::with_factory(
            name,
            ProviderFactory::Output(Arc::new(move |config| {
                factory(config).map(|p| Arc::new(p) as Arc<dyn OutputProvider>)
            })),
        )
    }

    fn with_factory(name: impl Into<String>, factory: ProviderFactory) -> Self {
        Self {
            name: name.into(),
            source: "builtin".to_string(),
            factory,
            allowed_patterns: None,
        }
    }

    /// Set the source label.
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Restrict the provider's own subscriptions.
    #[must_use]
    pub fn allow(mut self, patterns: Vec<Pattern>) -> Self {
        self.allowed_patterns = Some(patterns);
        self
    }

    /// Layer derived from the factory.
    #[must_use]
    pub fn layer(&self) -> Layer {
        self.factory.layer()
    }

    /// Subscription rule installed for this provider's domain tag.
    #[must_use]
    pub fn subscription_rule(&self) -> Option<Vec<Pattern>> {
        self.allowed_patterns
            .clone()
            .or_else(|| ArchitecturalValidator::layer_patterns(self.layer()))
    }
}

/// All descriptors known to the application.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    descriptors: RwLock<BTreeMap<(Layer, String), Arc<ProviderDescriptor>>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor.
    ///
    /// # Errors
    ///
    /// - [`ConfigurationError::DuplicateProvider`] for a second `(layer, name)`.
    /// - [`ConfigurationError::DescriptorOutsideLayer`] if `allowed_patterns`
    ///   reaches beyond what the layer may subscribe to.
    pub fn register(&self, descriptor: ProviderDescriptor) -> Result<(), ConfigurationError> {
        let layer = descriptor.layer();

        if let Some(allowed) = &descriptor.allowed_patterns {
            let layer_rule = ArchitecturalValidator::layer_patterns(layer).unwrap_or_default();
            if let Some(outside) = allowed
                .iter()
                .find(|p| !layer_rule.iter().any(|l| l.covers(p)))
            {
                return Err(ConfigurationError::DescriptorOutsideLayer {
                    layer,
                    name: descriptor.name.clone(),
                    pattern: outside.to_string(),
                });
            }
        }

        let key = (layer, descriptor.name.clone());
        let mut descriptors = self.descriptors.write();
        if descriptors.contains_key(&key) {
            return Err(ConfigurationError::DuplicateProvider {
                layer,
                name: descriptor.name,
            });
        }

        info!(
            "[Registry] Registering {} provider '{}' ({})",
            layer, descriptor.name, descriptor.source
        );
        descriptors.insert(key, Arc::new(descriptor));
        Ok(())
    }

    /// Look up a descriptor.
    #[must_use]
    pub fn get(&self, layer: Layer, name: &str) -> Option<Arc<ProviderDescriptor>> {
        self.descriptors
            .read()
            .get(&(layer, name.to_string()))
            .cloned()
    }

    /// Registered names for `layer`, sorted.
    #[must_use]
    pub fn names(&self, layer: Layer) -> Vec<String> {
        self.descriptors
            .read()
            .keys()
            .filter(|(l, _)| *l == layer)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Number of descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.read().len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
