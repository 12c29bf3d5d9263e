//! # Payload Registry
//!
//! Maps each event name to the one payload kind it may carry. Populated at
//! startup; consulted by every `emit` and every typed `on`.

use crate::error::BusError;
use parking_lot::RwLock;
use relay_types::events::{
    DECISION_INTENT_GENERATED, DECISION_REQUEST_FAILED, INPUT_MESSAGE_READY,
    INPUT_PROVIDER_CONNECTED, INPUT_PROVIDER_DISCONNECTED, OUTPUT_RENDER_COMPLETED,
    OUTPUT_RENDER_FAILED,
};
use relay_types::{ConfigurationError, EventName, Payload, PayloadKind, Pattern, ValidationError};
use std::collections::HashMap;
use tracing::debug;

/// Event name → payload kind table.
#[derive(Debug, Default)]
pub struct PayloadRegistry {
    schemas: RwLock<HashMap<String, PayloadKind>>,
}

impl PayloadRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the standard event taxonomy.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        let defaults = [
            (INPUT_MESSAGE_READY, PayloadKind::Message),
            (INPUT_PROVIDER_CONNECTED, PayloadKind::ProviderStatus),
            (INPUT_PROVIDER_DISCONNECTED, PayloadKind::ProviderStatus),
            (DECISION_INTENT_GENERATED, PayloadKind::Intent),
            (DECISION_REQUEST_FAILED, PayloadKind::Failure),
            (OUTPUT_RENDER_COMPLETED, PayloadKind::RenderCompleted),
            (OUTPUT_RENDER_FAILED, PayloadKind::Failure),
        ];
        {
            let mut schemas = registry.schemas.write();
            for (name, kind) in defaults {
                schemas.insert(name.to_string(), kind);
            }
        }
        registry
    }

    /// Register `name` as carrying `kind`.
    ///
    /// Re-registering the same pair is a no-op; a different kind is a
    /// [`ConfigurationError::ConflictingSchema`].
    pub fn register(&self, name: &str, kind: PayloadKind) -> Result<(), BusError> {
        let name = EventName::parse(name)?;
        let mut schemas = self.schemas.write();

        match schemas.get(name.as_str()) {
            Some(existing) if *existing == kind => Ok(()),
            Some(existing) => Err(ConfigurationError::ConflictingSchema {
                name: name.to_string(),
                existing: *existing,
                requested: kind,
            }
            .into()),
            None => {
                debug!(event = %name, kind = %kind, "Registered event schema");
                schemas.insert(name.to_string(), kind);
                Ok(())
            }
        }
    }

    /// Check that `payload` is the registered kind for `name`.
    pub fn validate(&self, name: &str, payload: &Payload) -> Result<(), ValidationError> {
        let Some(expected) = self.kind_of(name) else {
            return Err(ValidationError::UnknownEvent {
                name: name.to_string(),
            });
        };

        let actual = payload.kind();
        if actual != expected {
            return Err(ValidationError::PayloadMismatch {
                name: name.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Registered kind for `name`.
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<PayloadKind> {
        self.schemas.read().get(name).copied()
    }

    /// Every registered `(name, kind)` matched by `pattern`, sorted by name.
    #[must_use]
    pub fn entries_matching(&self, pattern: &Pattern) -> Vec<(String, PayloadKind)> {
        let mut entries: Vec<_> = self
            .schemas
            .read()
            .iter()
            .filter(|(name, _)| pattern.matches(name))
            .map(|(name, kind)| (name.clone(), *kind))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Registered names matched by `pattern`, sorted.
    #[must_use]
    pub fn names_matching(&self, pattern: &Pattern) -> Vec<String> {
        self.entries_matching(pattern)
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    /// Number of registered names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
