//! # Relay Bus - Typed Event Bus for Provider Coordination
//!
//! The control plane of the coordination layer. Providers publish typed
//! events; subscribers register handlers for exact names or namespace
//! wildcards.
//!
//! ## Dispatch
//!
//! ```text
//!  emit(name, payload)
//!        │
//!        ▼
//!  PayloadRegistry::validate ──✗──► ValidationError (no handler runs)
//!        │
//!        ▼
//!  snapshot matching subscriptions, sorted by priority
//!        │
//!        ▼
//!  tier 10 ──► [h1 ‖ h2]  (concurrent tasks)
//!  tier 50 ──► [h3]
//!  tier 100 ─► [h4 ‖ h5]
//! ```
//!
//! ## Subscription Rules
//!
//! Every `on` passes through the [`ArchitecturalValidator`] before anything
//! is inserted. The default table only lets `decision` listen to `input.*`
//! and `output` listen to `decision.*`.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod error;
pub mod registry;
pub mod stats;
pub mod subscription;
pub mod validator;

pub use bus::{CleanupReport, EmitOptions, EmitReceipt, EventBus};
pub use error::BusError;
pub use registry::PayloadRegistry;
pub use stats::EventStats;
pub use subscription::{handler_fn, EventHandler, SubscriptionHandle, SubscriptionSpec};
pub use validator::{ArchitecturalValidator, ValidationMode};

use std::time::Duration;

/// Priority assigned when a subscription does not specify one.
pub const DEFAULT_PRIORITY: i32 = 100;

/// Default bound for [`EventBus::cleanup`].
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Time given to cancelled dispatch tasks to unwind after a forced cleanup.
pub const FORCED_CANCEL_GRACE: Duration = Duration::from_millis(250);
