//! # Subscriptions
//!
//! Handler trait, subscription requests and the internal subscription record.

use crate::DEFAULT_PRIORITY;
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use relay_types::{BoxError, DomainTag, Event, PayloadKind, Pattern};
use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::future::{poll_fn, Future};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Poll;

thread_local! {
    /// Subscription whose handler is taking its first poll on this thread.
    static STARTING: Cell<u64> = const { Cell::new(0) };
}

/// Outcome of one handler call; `Err` carries a panic.
pub(crate) type Delivery = Result<Result<(), BoxError>, Box<dyn Any + Send>>;

/// A subscriber callback.
///
/// Handlers receive the event behind an `Arc` and must not mutate it.
/// Returning `Err` or panicking counts as a handler failure.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Handle one event.
    async fn handle(&self, event: Arc<Event>) -> Result<(), BoxError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    async fn handle(&self, event: Arc<Event>) -> Result<(), BoxError> {
        (self.0)(event).await
    }
}

/// Wrap an async closure as an [`EventHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// A subscription request passed to [`EventBus::on`](crate::EventBus::on).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSpec {
    /// Exact name, `prefix.*` or `*`.
    pub pattern: String,
    /// Declared payload kind; `None` accepts any payload.
    pub payload_kind: Option<PayloadKind>,
    /// Lower values dispatch first.
    pub priority: i32,
    /// Identity checked by the architectural validator.
    pub domain_tag: Option<DomainTag>,
}

impl SubscriptionSpec {
    /// Untyped request at the default priority.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            payload_kind: None,
            priority: DEFAULT_PRIORITY,
            domain_tag: None,
        }
    }

    /// Declare the payload kind this handler expects.
    #[must_use]
    pub fn expecting(mut self, kind: PayloadKind) -> Self {
        self.payload_kind = Some(kind);
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the domain tag.
    #[must_use]
    pub fn domain(mut self, tag: impl Into<DomainTag>) -> Self {
        self.domain_tag = Some(tag.into());
        self
    }
}

/// Returned by `on`; pass to `off` to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub(crate) id: u64,
    pub(crate) pattern: Pattern,
}

impl SubscriptionHandle {
    /// Subscription id, unique per bus.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Pattern the subscription was registered with.
    #[must_use]
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }
}

pub(crate) struct Subscription {
    pub(crate) id: u64,
    pub(crate) pattern: Pattern,
    pub(crate) handler: Arc<dyn EventHandler>,
    pub(crate) priority: i32,
    pub(crate) label: String,
    active: AtomicBool,
    gate: RwLock<()>,
}

impl Subscription {
    pub(crate) fn new(
        id: u64,
        pattern: Pattern,
        handler: Arc<dyn EventHandler>,
        priority: i32,
        domain_tag: Option<&DomainTag>,
    ) -> Self {
        let label = match domain_tag {
            Some(tag) => tag.to_string(),
            None => pattern.to_string(),
        };
        Self {
            id,
            pattern,
            handler,
            priority,
            label,
            active: AtomicBool::new(true),
            gate: RwLock::new(()),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop further deliveries.
    ///
    /// Waits for any delivery that already passed the active check to finish
    /// its first poll, unless that delivery is the caller.
    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        if STARTING.get() != self.id {
            drop(self.gate.write());
        }
    }

    /// Call the handler unless the subscription is inactive.
    ///
    /// The active check and the handler's first poll hold the gate, so a
    /// delivery either begins before `deactivate` returns or not at all.
    /// Returns `None` when nothing was delivered.
    pub(crate) async fn deliver(&self, event: Arc<Event>) -> Option<Delivery> {
        let mut call = AssertUnwindSafe(self.handler.handle(event)).catch_unwind();
        let mut started = false;

        poll_fn(|cx| {
            if started {
                return call.poll_unpin(cx).map(Some);
            }
            let _gate = self.gate.read();
            if !self.is_active() {
                return Poll::Ready(None);
            }
            started = true;
            let previous = STARTING.replace(self.id);
            let polled = call.poll_unpin(cx);
            STARTING.set(previous);
            polled.map(Some)
        })
        .await
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .field("priority", &self.priority)
            .field("label", &self.label)
            .field("active", &self.is_active())
            .finish()
    }
}
