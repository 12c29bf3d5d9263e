//! # Relay Stream - Binary Data Plane
//!
//! Large payloads (generated audio) bypass the event bus and fan out through
//! the [`StreamingChannel`]. Every subscriber owns a private bounded FIFO queue
//! governed by its own [`BackpressurePolicy`], so one slow consumer never
//! stalls or drops chunks for another.
//!
//! ```text
//!                       ┌── queue(size=8, Block) ────► tts-player
//!  producer ─publish──► ├── queue(size=2, DropOldest) ► meter
//!                       └── queue(size=4, FailFast) ──► recorder
//! ```
//!
//! ## Session
//!
//! `notify_start(meta)` → N × `publish(chunk)` → `notify_end(meta)`.
//! Start/end markers are control items: they are never dropped and never
//! count against `queue_size`.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod channel;
pub mod config;
pub mod error;
pub mod queue;
pub mod subscriber;

pub use channel::{StreamSubscription, StreamingChannel};
pub use config::{BackpressurePolicy, SubscriberConfig};
pub use error::StreamError;
pub use queue::{SessionState, StreamItem, StreamStats};
pub use subscriber::{StreamReceiver, StreamSubscriber};

/// Queue size used by [`SubscriberConfig::default`].
pub const DEFAULT_QUEUE_SIZE: usize = 64;
