//! # Relay Types Crate
//!
//! Single source of truth for everything that crosses a component boundary
//! inside the coordination layer: event names, payloads, layers, subscription
//! patterns and the error taxonomy.
//!
//! ## Design Principles
//!
//! - **Closed payload set**: every event name maps to exactly one
//!   [`PayloadKind`]; there is no dynamic payload.
//! - **Three-part taxonomy**: event names are `{layer}.{component}.{action}`.
//! - **Explicit identity**: subscribers identify themselves with a
//!   [`DomainTag`] instead of being inferred from call sites.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod audio;
pub mod errors;
pub mod events;
pub mod layer;
pub mod pattern;
pub mod payload;
pub mod provider;

pub use audio::{AudioChunk, SampleFormat, StreamMetadata};
pub use errors::*;
pub use events::EventName;
pub use layer::{DomainTag, Layer};
pub use pattern::Pattern;
pub use payload::{
    Event, FailurePayload, IntentAction, IntentPayload, MessagePayload, Payload, PayloadKind,
    ProviderStatusPayload, RenderCompletedPayload,
};
pub use provider::ProviderStatus;
