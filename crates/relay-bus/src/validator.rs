//! # Architectural Validator
//!
//! Registration-time gate that keeps subscriptions inside the layered
//! topology `input -> decision -> output`.
//!
//! ## Rules
//!
//! - Every subscriber presents a [`DomainTag`].
//! - The table maps a tag to its allowed patterns, or to `None` when the tag
//!   may not subscribe at all.
//! - An exact request is allowed if an allowed pattern matches it; a wildcard
//!   request only if an allowed pattern covers the whole namespace.
//! - Unknown (or missing) tags are rejected in [`ValidationMode::Strict`] and
//!   let through with a warning in [`ValidationMode::Permissive`].
//!
//! The validator never runs on `emit`.

use parking_lot::RwLock;
use relay_types::{ArchitecturalViolationError, DomainTag, Layer, Pattern};
use std::collections::HashMap;
use tracing::{debug, warn};

/// How unknown domain tags are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Unknown tags are rejected.
    #[default]
    Strict,
    /// Unknown tags may subscribe to anything.
    Permissive,
}

/// Domain tag → allowed subscription patterns.
#[derive(Debug, Default)]
pub struct ArchitecturalValidator {
    mode: ValidationMode,
    rules: RwLock<HashMap<DomainTag, Option<Vec<Pattern>>>>,
}

impl ArchitecturalValidator {
    /// Create a validator with an empty table.
    #[must_use]
    pub fn new(mode: ValidationMode) -> Self {
        Self {
            mode,
            rules: RwLock::new(HashMap::new()),
        }
    }

    /// Create a validator holding the default layer topology.
    ///
    /// - `input`: no subscriptions
    /// - `decision`: `input.*`
    /// - `output`: `decision.*`
    #[must_use]
    pub fn layered(mode: ValidationMode) -> Self {
        let validator = Self::new(mode);
        for layer in Layer::all() {
            validator.set_rule(DomainTag::for_layer(layer), Self::layer_patterns(layer));
        }
        validator
    }

    /// Patterns a whole layer may subscribe to.
    #[must_use]
    pub fn layer_patterns(layer: Layer) -> Option<Vec<Pattern>> {
        layer
            .upstream()
            .map(|upstream| vec![Pattern::Prefix(format!("{}.", upstream.segment()))])
    }

    /// The configured mode.
    #[must_use]
    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Install or replace the rule for `tag`.
    pub fn set_rule(&self, tag: DomainTag, allowed: Option<Vec<Pattern>>) {
        debug!(tag = %tag, allowed = ?allowed, "Installed subscription rule");
        self.rules.write().insert(tag, allowed);
    }

    /// Remove the rule for `tag`.
    pub fn remove_rule(&self, tag: &DomainTag) -> bool {
        self.rules.write().remove(tag).is_some()
    }

    /// Whether a rule exists for `tag`.
    #[must_use]
    pub fn has_rule(&self, tag: &DomainTag) -> bool {
        self.rules.read().contains_key(tag)
    }

    /// Check a subscription request.
    pub fn check(
        &self,
        tag: Option<&DomainTag>,
        requested: &str,
    ) -> Result<(), ArchitecturalViolationError> {
        let violation = |reason: String| ArchitecturalViolationError {
            domain_tag: tag.cloned(),
            pattern: requested.to_string(),
            reason,
        };

        let rules = self.rules.read();
        let rule = tag.and_then(|t| rules.get(t));

        let Some(rule) = rule else {
            return match self.mode {
                ValidationMode::Strict => Err(violation(match tag {
                    Some(_) => "domain tag is not registered".to_string(),
                    None => "strict mode requires a domain tag".to_string(),
                })),
                ValidationMode::Permissive => {
                    warn!(
                        tag = ?tag.map(DomainTag::as_str),
                        pattern = requested,
                        "Unregistered domain tag subscribing (permissive mode)"
                    );
                    Ok(())
                }
            };
        };

        let allowed = match rule {
            Some(allowed) if !allowed.is_empty() => allowed,
            _ => return Err(violation("no subscriptions permitted".to_string())),
        };

        let Ok(pattern) = Pattern::parse(requested) else {
            return Err(violation("not a valid event pattern".to_string()));
        };

        if allowed.iter().any(|a| a.covers(&pattern)) {
            return Ok(());
        }

        let listing: Vec<String> = allowed.iter().map(ToString::to_string).collect();
        Err(violation(format!("allowed: [{}]", listing.join(", "))))
    }

    /// Boolean form of [`check`](Self::check) for static descriptor checks.
    #[must_use]
    pub fn allows(&self, tag: &DomainTag, requested: &str) -> bool {
        self.check(Some(tag), requested).is_ok()
    }
}
