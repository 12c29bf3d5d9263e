//! # Event Bus
//!
//! Typed publish/subscribe with priority tiers.
//!
//! ## Guarantees
//!
//! - A payload that does not match the registry never reaches a handler.
//! - Within one emit, every handler of a lower priority value is invoked
//!   before any handler of a higher one. Handlers of the same priority run
//!   concurrently.
//! - After `off` returns, no new call of the removed handler begins. A call
//!   that began earlier may still be running.
//! - Once `cleanup` starts, no dispatch is spawned that it does not wait for.
//! - `cleanup` is the only cancellation primitive: it refuses new work, waits
//!   for in-flight dispatches and optionally cancels what is left.

use crate::error::BusError;
use crate::registry::PayloadRegistry;
use crate::stats::{EventStats, StatsTable};
use crate::subscription::{EventHandler, Subscription, SubscriptionHandle, SubscriptionSpec};
use crate::validator::{ArchitecturalValidator, ValidationMode};
use crate::FORCED_CANCEL_GRACE;
use parking_lot::RwLock;
use relay_types::{
    ConfigurationError, Event, EventName, HandlerError, Payload, PayloadKind, Pattern,
    ValidationError,
};
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

// =============================================================================
// OPTIONS & RESULTS
// =============================================================================

/// Per-emit dispatch options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitOptions {
    /// Record handler failures independently instead of surfacing the first.
    pub error_isolate: bool,
    /// Return only after every handler has finished.
    pub wait: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            error_isolate: true,
            wait: false,
        }
    }
}

impl EmitOptions {
    /// Wait for every handler.
    #[must_use]
    pub fn waiting() -> Self {
        Self {
            wait: true,
            ..Self::default()
        }
    }

    /// Wait for every handler and return the first failure.
    #[must_use]
    pub fn propagating() -> Self {
        Self {
            error_isolate: false,
            wait: true,
        }
    }
}

/// Outcome of a successful `emit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitReceipt {
    /// Id stamped on the dispatched event.
    pub event_id: Uuid,
    /// Subscriptions matched at emit time.
    pub listeners: usize,
}

/// What `cleanup` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanupReport {
    /// Every in-flight dispatch finished before the deadline.
    pub drained: bool,
    /// Dispatches in flight when cleanup began.
    pub in_flight_at_start: usize,
    /// Dispatches cancelled after the deadline.
    pub cancelled: usize,
    /// Subscriptions removed.
    pub subscriptions_removed: usize,
}

// =============================================================================
// EVENT BUS
// =============================================================================

/// In-process typed event bus.
pub struct EventBus {
    registry: Arc<PayloadRegistry>,
    validator: Arc<ArchitecturalValidator>,
    subscriptions: RwLock<Vec<Arc<Subscription>>>,
    next_id: AtomicU64,
    stats: Arc<StatsTable>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    closed: AtomicBool,
    /// Held shared by `on`/`emit` from the closed check until their work is
    /// registered, and exclusively by `cleanup` while it closes the bus.
    admission: RwLock<()>,
}

impl EventBus {
    /// Create a bus over an existing registry and validator.
    #[must_use]
    pub fn new(registry: Arc<PayloadRegistry>, validator: Arc<ArchitecturalValidator>) -> Self {
        Self {
            registry,
            validator,
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            stats: Arc::new(StatsTable::default()),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
            admission: RwLock::new(()),
        }
    }

    /// Bus with the standard taxonomy and the layered topology.
    #[must_use]
    pub fn layered(mode: ValidationMode) -> Self {
        Self::new(
            Arc::new(PayloadRegistry::with_defaults()),
            Arc::new(ArchitecturalValidator::layered(mode)),
        )
    }

    /// The payload registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<PayloadRegistry> {
        &self.registry
    }

    /// The architectural validator.
    #[must_use]
    pub fn validator(&self) -> &Arc<ArchitecturalValidator> {
        &self.validator
    }

    // -------------------------------------------------------------------------
    // Subscribe
    // -------------------------------------------------------------------------

    /// Register `handler` for events matching `spec.pattern`.
    ///
    /// # Errors
    ///
    /// - [`BusError::Violation`] if the validator refuses the domain tag.
    /// - [`BusError::Validation`] for a malformed pattern or an unregistered
    ///   exact name.
    /// - [`BusError::Configuration`] if the declared payload kind disagrees
    ///   with the registry.
    pub fn on(
        &self,
        spec: SubscriptionSpec,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionHandle, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        if let Err(violation) = self.validator.check(spec.domain_tag.as_ref(), &spec.pattern) {
            warn!(error = %violation, "Subscription rejected");
            return Err(violation.into());
        }

        let pattern = Pattern::parse(&spec.pattern)?;
        self.check_kind(&pattern, spec.payload_kind)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscription = Arc::new(Subscription::new(
            id,
            pattern.clone(),
            handler,
            spec.priority,
            spec.domain_tag.as_ref(),
        ));

        {
            let _admission = self.admission.read();
            if self.is_closed() {
                return Err(BusError::Closed);
            }
            self.subscriptions.write().push(Arc::clone(&subscription));
        }
        debug!(
            id,
            pattern = %pattern,
            priority = spec.priority,
            label = %subscription.label,
            "Subscription registered"
        );

        Ok(SubscriptionHandle { id, pattern })
    }

    fn check_kind(&self, pattern: &Pattern, declared: Option<PayloadKind>) -> Result<(), BusError> {
        let mismatch = |name: &str, declared: PayloadKind, registered: PayloadKind| {
            BusError::from(ConfigurationError::SubscriptionTypeMismatch {
                pattern: pattern.to_string(),
                name: name.to_string(),
                declared,
                registered,
            })
        };

        match pattern {
            Pattern::Exact(name) => {
                let registered =
                    self.registry
                        .kind_of(name)
                        .ok_or_else(|| ValidationError::UnknownEvent {
                            name: name.clone(),
                        })?;
                match declared {
                    Some(declared) if declared != registered => {
                        Err(mismatch(name, declared, registered))
                    }
                    _ => Ok(()),
                }
            }
            Pattern::Prefix(_) | Pattern::All => {
                let Some(declared) = declared else {
                    return Ok(());
                };
                match self
                    .registry
                    .entries_matching(pattern)
                    .into_iter()
                    .find(|(_, kind)| *kind != declared)
                {
                    Some((name, registered)) => Err(mismatch(&name, declared, registered)),
                    None => Ok(()),
                }
            }
        }
    }

    /// Remove a subscription.
    ///
    /// Returns `false` if it was already gone. No call of the handler begins
    /// after this returns, including calls from dispatches already in flight.
    /// A call that began earlier may still be running.
    pub fn off(&self, handle: &SubscriptionHandle) -> bool {
        let removed = {
            let mut subscriptions = self.subscriptions.write();
            subscriptions
                .iter()
                .position(|s| s.id == handle.id)
                .map(|index| subscriptions.remove(index))
        };

        match removed {
            Some(subscription) => {
                subscription.deactivate();
                debug!(id = handle.id, pattern = %handle.pattern, "Subscription removed");
                true
            }
            None => false,
        }
    }

    /// Subscriptions that would receive an event called `name`.
    #[must_use]
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.subscriptions
            .read()
            .iter()
            .filter(|s| s.pattern.matches(name))
            .count()
    }

    /// Total number of subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    // -------------------------------------------------------------------------
    // Emit
    // -------------------------------------------------------------------------

    /// Validate and dispatch an event.
    ///
    /// With `wait = false` this returns as soon as the dispatch task is
    /// scheduled. With `wait = true` it returns after every handler finished,
    /// and with `error_isolate = false` the first handler failure is returned.
    ///
    /// # Errors
    ///
    /// - [`BusError::Validation`] if the payload does not match the registry.
    /// - [`BusError::Closed`] after `cleanup`.
    /// - [`BusError::Handler`] / [`BusError::Cancelled`] when waiting.
    pub async fn emit(
        &self,
        name: &str,
        payload: impl Into<Payload>,
        source: &str,
        options: EmitOptions,
    ) -> Result<EmitReceipt, BusError> {
        let payload = payload.into();
        let (receipt, task) = {
            let _admission = self.admission.read();
            if self.is_closed() {
                return Err(BusError::Closed);
            }

            if let Err(e) = self.validate(name, &payload) {
                if self.registry.kind_of(name).is_some() {
                    self.stats.record_error(name);
                }
                warn!(event = name, source, error = %e, "Emit rejected");
                return Err(e.into());
            }

            let event = Arc::new(Event::new(name, payload, source));
            let matched = self.snapshot(name);
            let receipt = EmitReceipt {
                event_id: event.id,
                listeners: matched.len(),
            };
            self.stats.record_emit(name, matched.len());

            debug!(
                event = name,
                source,
                id = %event.id,
                listeners = matched.len(),
                payload = %event.payload,
                "Event emitted"
            );

            if matched.is_empty() {
                return Ok(receipt);
            }

            let cancel = self.cancel.clone();
            let stats = self.stats.clone();
            let isolate = options.error_isolate;
            let task = self.tracker.spawn(async move {
                let name = event.name.clone();
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        warn!(event = %name, "Dispatch cancelled");
                        Err(BusError::Cancelled { event: name })
                    }
                    result = dispatch(event, matched, stats, isolate) => result.map_err(BusError::from),
                }
            });
            (receipt, task)
        };

        if !options.wait {
            return Ok(receipt);
        }

        match task.await {
            Ok(Ok(())) => Ok(receipt),
            Ok(Err(e)) => Err(e),
            Err(join_err) => {
                warn!(event = name, error = %join_err, "Dispatch task failed");
                Err(BusError::Cancelled {
                    event: name.to_string(),
                })
            }
        }
    }

    fn validate(&self, name: &str, payload: &Payload) -> Result<(), ValidationError> {
        EventName::parse(name)?;
        self.registry.validate(name, payload)
    }

    fn snapshot(&self, name: &str) -> Vec<Arc<Subscription>> {
        let mut matched: Vec<_> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.pattern.matches(name))
            .cloned()
            .collect();
        matched.sort_by_key(|s| (s.priority, s.id));
        matched
    }

    // -------------------------------------------------------------------------
    // Statistics
    // -------------------------------------------------------------------------

    /// Counters for one event name.
    #[must_use]
    pub fn get_stats(&self, name: &str) -> Option<EventStats> {
        self.stats.get(name)
    }

    /// Counters for every event name seen so far.
    #[must_use]
    pub fn get_all_stats(&self) -> HashMap<String, EventStats> {
        self.stats.all()
    }

    /// Reset counters for one name, or all of them.
    pub fn reset_stats(&self, name: Option<&str>) {
        self.stats.reset(name);
    }

    /// Dispatch tasks currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Whether `cleanup` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // -------------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------------

    /// Stop the bus.
    ///
    /// New emits and subscriptions are refused immediately. In-flight
    /// dispatches get `timeout` to finish; with `force` the remainder is
    /// cancelled. Every subscription is removed and deactivated.
    pub async fn cleanup(&self, timeout: Duration, force: bool) -> CleanupReport {
        {
            let _admission = self.admission.write();
            self.closed.store(true, Ordering::Release);
        }
        self.tracker.close();

        let in_flight_at_start = self.tracker.len();
        info!(
            in_flight = in_flight_at_start,
            timeout_ms = timeout.as_millis() as u64,
            force,
            "[EventBus] Cleaning up"
        );

        let drained = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();

        let mut cancelled = 0;
        if !drained {
            if force {
                cancelled = self.tracker.len();
                warn!(cancelled, "[EventBus] Deadline passed, cancelling dispatches");
                self.cancel.cancel();
                if tokio::time::timeout(FORCED_CANCEL_GRACE, self.tracker.wait())
                    .await
                    .is_err()
                {
                    warn!(
                        remaining = self.tracker.len(),
                        "[EventBus] Dispatches still unwinding after cancel"
                    );
                }
            } else {
                warn!(
                    remaining = self.tracker.len(),
                    "[EventBus] Deadline passed, leaving dispatches running"
                );
            }
        }

        let removed: Vec<_> = self.subscriptions.write().drain(..).collect();
        for subscription in &removed {
            subscription.deactivate();
        }

        let report = CleanupReport {
            drained,
            in_flight_at_start,
            cancelled,
            subscriptions_removed: removed.len(),
        };
        info!(?report, "[EventBus] Cleanup complete");
        report
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::layered(ValidationMode::Permissive)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscription_count())
            .field("in_flight", &self.in_flight())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Run every matched handler, one priority tier at a time.
async fn dispatch(
    event: Arc<Event>,
    matched: Vec<Arc<Subscription>>,
    stats: Arc<StatsTable>,
    isolate: bool,
) -> Result<(), HandlerError> {
    let mut first_failure = None;

    for tier in matched.chunk_by(|a, b| a.priority == b.priority) {
        let mut set = JoinSet::new();
        for subscription in tier {
            set.spawn(invoke(event.clone(), subscription.clone(), stats.clone()));
        }

        while let Some(joined) = set.join_next().await {
            let failure = match joined {
                Ok(None) => continue,
                Ok(Some(failure)) => failure,
                Err(join_err) => {
                    debug!(event = %event.name, error = %join_err, "Handler task aborted");
                    continue;
                }
            };

            stats.record_error(&event.name);
            warn!(
                event = %event.name,
                subscription = failure.subscription_id,
                label = %failure.label,
                panicked = failure.panicked,
                error = %failure.message,
                "Handler failed"
            );

            if !isolate {
                set.abort_all();
                return Err(failure);
            }
            first_failure.get_or_insert(failure);
        }
    }

    if let Some(failure) = first_failure {
        debug!(event = %event.name, first = %failure, "Dispatch finished with isolated failures");
    }
    Ok(())
}

async fn invoke(
    event: Arc<Event>,
    subscription: Arc<Subscription>,
    stats: Arc<StatsTable>,
) -> Option<HandlerError> {
    let started = Instant::now();
    let outcome = subscription.deliver(event.clone()).await?;
    stats.record_execution(&event.name, started.elapsed());

    let (message, panicked) = match outcome {
        Ok(Ok(())) => return None,
        Ok(Err(e)) => (e.to_string(), false),
        Err(panic) => (panic_message(panic.as_ref()), true),
    };

    Some(HandlerError {
        event: event.name.clone(),
        event_id: event.id,
        subscription_id: subscription.id,
        label: subscription.label.clone(),
        message,
        panicked,
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
