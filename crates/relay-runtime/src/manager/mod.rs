//! # Layer Managers
//!
//! One manager per layer owns that layer's provider instances, tracks their
//! status and drives them:
//!
//! - [`InputManager`]: one pump task per provider, reconnecting with backoff.
//! - [`DecisionManager`]: fans `input.message.ready` out to `decide`.
//! - [`OutputManager`]: fans `decision.intent.generated` out to `render`.
//!
//! Every provider call runs in isolation: an error, a panic or a timeout in
//! one provider becomes a [`ProviderLifecycleError`] and never reaches the
//! other providers of the layer. Per event, each provider runs as its own
//! task, so a slow provider never holds up its siblings.

mod decision;
mod input;
mod output;

pub use decision::DecisionManager;
pub use input::{normalize, InputManager};
pub use output::OutputManager;

use crate::config::{FailurePolicy, LayerConfig};
use crate::provider::ProviderContext;
use crate::registry::{Factory, ProviderFactory, ProviderRegistry};
use futures::FutureExt;
use parking_lot::Mutex;
use relay_types::{
    BoxError, ConfigurationError, Layer, ProviderErrorKind, ProviderLifecycleError, ProviderStatus,
};
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

// =============================================================================
// REPORTS
// =============================================================================

/// Snapshot of one provider's state and counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderReport {
    /// Provider name.
    pub name: String,
    /// Provider layer.
    pub layer: Layer,
    /// Current status.
    pub status: ProviderStatus,
    /// Items emitted (input) or events handled (decision/output).
    pub handled: u64,
    /// Failed calls.
    pub failed: u64,
    /// Events discarded under [`FailurePolicy::Drop`].
    pub dropped: u64,
    /// Reconnect attempts (input only).
    pub reconnects: u64,
    /// Most recent error message.
    pub last_error: Option<String>,
}

// =============================================================================
// SLOT
// =============================================================================

/// One loaded provider plus its bookkeeping.
pub(crate) struct Slot<P: ?Sized> {
    pub(crate) name: String,
    pub(crate) layer: Layer,
    pub(crate) provider: Arc<P>,
    status: Mutex<ProviderStatus>,
    last_error: Mutex<Option<String>>,
    context: Mutex<Option<ProviderContext>>,
    handled: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    reconnects: AtomicU64,
}

impl<P: ?Sized> Slot<P> {
    fn new(name: String, layer: Layer, provider: Arc<P>) -> Self {
        Self {
            name,
            layer,
            provider,
            status: Mutex::new(ProviderStatus::Loaded),
            last_error: Mutex::new(None),
            context: Mutex::new(None),
            handled: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        }
    }

    pub(crate) fn status(&self) -> ProviderStatus {
        *self.status.lock()
    }

    pub(crate) fn set_status(&self, status: ProviderStatus) {
        let previous = std::mem::replace(&mut *self.status.lock(), status);
        if previous != status {
            debug!(
                provider = %self.name,
                layer = %self.layer,
                from = %previous,
                to = %status,
                "Provider status changed"
            );
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.status().is_active()
    }

    pub(crate) fn record_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, message: impl Into<String>) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(message.into());
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn attach(&self, context: ProviderContext) {
        *self.context.lock() = Some(context);
    }

    /// Drop the context and every subscription made through it.
    pub(crate) fn detach(&self) -> usize {
        self.context
            .lock()
            .take()
            .map_or(0, |ctx| ctx.unsubscribe_all())
    }

    pub(crate) fn error(&self, kind: ProviderErrorKind, message: impl std::fmt::Display) -> ProviderLifecycleError {
        ProviderLifecycleError::new(self.layer, self.name.clone(), kind, message)
    }

    pub(crate) fn report(&self) -> ProviderReport {
        ProviderReport {
            name: self.name.clone(),
            layer: self.layer,
            status: self.status(),
            handled: self.handled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
        }
    }
}

// =============================================================================
// LOADING
// =============================================================================

/// Providers that loaded plus the ones whose constructor failed.
pub(crate) struct Loaded<P: ?Sized> {
    pub(crate) slots: Vec<Arc<Slot<P>>>,
    pub(crate) rejected: Vec<ProviderReport>,
    pub(crate) errors: Vec<ProviderLifecycleError>,
}

/// Instantiate every provider `config` enables for `layer`.
///
/// Unknown names fail the whole layer; constructor failures are isolated.
pub(crate) fn instantiate<P: ?Sized>(
    layer: Layer,
    config: &LayerConfig,
    registry: &ProviderRegistry,
    pick: impl Fn(&ProviderFactory) -> Option<&Factory<P>>,
) -> Result<Loaded<P>, ConfigurationError> {
    let mut loaded = Loaded {
        slots: Vec::new(),
        rejected: Vec::new(),
        errors: Vec::new(),
    };

    if !config.enabled {
        info!("[Manager] Layer {} disabled, no providers loaded", layer);
        return Ok(loaded);
    }

    for (name, blob) in &config.providers {
        let descriptor = registry
            .get(layer, name)
            .ok_or_else(|| ConfigurationError::UnknownProvider {
                layer,
                name: name.clone(),
            })?;

        let Some(factory) = pick(&descriptor.factory) else {
            return Err(ConfigurationError::Invalid(format!(
                "descriptor '{name}' does not build a {layer} provider"
            )));
        };

        match std::panic::catch_unwind(AssertUnwindSafe(|| factory(blob))) {
            Ok(Ok(provider)) => {
                info!("[Manager] Loaded {} provider '{}'", layer, name);
                loaded
                    .slots
                    .push(Arc::new(Slot::new(name.clone(), layer, provider)));
            }
            outcome => {
                let message = match outcome {
                    Ok(Err(e)) => e.to_string(),
                    _ => "constructor panicked".to_string(),
                };
                error!(provider = %name, layer = %layer, error = %message, "Provider construction failed");
                loaded.errors.push(ProviderLifecycleError::new(
                    layer,
                    name.clone(),
                    ProviderErrorKind::Configuration,
                    &message,
                ));
                loaded.rejected.push(ProviderReport {
                    name: name.clone(),
                    layer,
                    status: ProviderStatus::Failed,
                    handled: 0,
                    failed: 1,
                    dropped: 0,
                    reconnects: 0,
                    last_error: Some(message),
                });
            }
        }
    }

    Ok(loaded)
}

// =============================================================================
// ISOLATION
// =============================================================================

/// Run one provider call, turning errors, panics and timeouts into a message.
pub(crate) async fn guarded<T, F>(timeout: Option<Duration>, call: F) -> Result<T, String>
where
    F: Future<Output = Result<T, BoxError>>,
{
    let call = AssertUnwindSafe(call).catch_unwind();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(outcome) => outcome,
            Err(_) => return Err(format!("timed out after {limit:?}")),
        },
        None => call.await,
    };

    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("provider panicked".to_string()),
    }
}

// =============================================================================
// FAILURE POLICY
// =============================================================================

/// What the fan-out does after one provider failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// Report the failure and move on to the next provider.
    Report,
    /// Move on without reporting.
    Skip,
    /// Report and abort the fan-out for this event.
    Abort,
}

/// Apply `policy` to a failure of `slot` and update its counters.
pub(crate) fn apply_policy<P: ?Sized>(
    policy: FailurePolicy,
    slot: &Slot<P>,
    event: &str,
    message: &str,
) -> Verdict {
    match policy {
        FailurePolicy::Continue => {
            slot.record_failure(message);
            warn!(provider = %slot.name, event = %event, error = %message, "Provider failed, continuing");
            Verdict::Report
        }
        FailurePolicy::Drop => {
            slot.record_dropped();
            debug!(provider = %slot.name, event = %event, error = %message, "Provider failed, event dropped");
            Verdict::Skip
        }
        FailurePolicy::Stop => {
            slot.record_failure(message);
            warn!(provider = %slot.name, event = %event, error = %message, "Provider failed, stopping fan-out");
            Verdict::Abort
        }
    }
}

/// Run `call` for every active slot as its own task.
///
/// An `Err` from any call aborts the calls still running and is returned.
pub(crate) async fn fan_out<P, F, Fut>(slots: &[Arc<Slot<P>>], call: F) -> Result<(), String>
where
    P: ?Sized + Send + Sync + 'static,
    F: Fn(Arc<Slot<P>>) -> Fut,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    let mut set = JoinSet::new();
    for slot in slots.iter().filter(|slot| slot.is_active()) {
        set.spawn(call(Arc::clone(slot)));
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(message)) => {
                set.abort_all();
                return Err(message);
            }
            Err(join_err) => debug!(error = %join_err, "Provider task aborted"),
        }
    }
    Ok(())
}

/// Run `cleanup` for every slot in isolation and mark it stopped.
pub(crate) async fn cleanup_slots<P, F, Fut>(
    slots: &[Arc<Slot<P>>],
    timeout: Duration,
    cleanup: F,
) -> Vec<ProviderLifecycleError>
where
    P: ?Sized,
    F: Fn(Arc<P>) -> Fut,
    Fut: Future<Output = Result<(), BoxError>>,
{
    let mut errors = Vec::new();

    for slot in slots {
        let removed = slot.detach();
        info!("[Manager] Cleaning up {} provider '{}'", slot.layer, slot.name);

        match guarded(Some(timeout), cleanup(Arc::clone(&slot.provider))).await {
            Ok(()) => {
                debug!(provider = %slot.name, subscriptions = removed, "Provider cleaned up");
                slot.set_status(ProviderStatus::Stopped);
            }
            Err(message) => {
                error!(provider = %slot.name, error = %message, "Provider cleanup failed");
                slot.record_failure(message.clone());
                slot.set_status(ProviderStatus::Failed);
                errors.push(slot.error(ProviderErrorKind::Cleanup, message));
            }
        }
    }

    errors
}
