//! # Relay Runtime
//!
//! Provider lifecycle on top of the event bus and the streaming channel.
//!
//! ## Layers
//!
//! ```text
//! ┌──────────────┐ input.message.ready ┌──────────────┐ decision.intent.generated ┌──────────────┐
//! │ InputManager │ ──────────────────► │ DecisionMgr  │ ────────────────────────► │ OutputManager│
//! │  pumps       │                     │  fan-out     │                           │  fan-out     │
//! └──────────────┘                     └──────────────┘                           └──────┬───────┘
//!                                                                                        │ PCM
//!                                                                                        ▼
//!                                                                               StreamingChannel
//! ```
//!
//! ## Wiring
//!
//! ```rust,ignore
//! let registry = Arc::new(ProviderRegistry::new());
//! register_builtins(&registry)?;
//!
//! let mut runtime = Runtime::new(RuntimeConfig::from_json_str(json)?, registry);
//! let failures = runtime.start().await?;
//! // ...
//! let report = runtime.shutdown().await?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod backoff;
pub mod builtin;
pub mod config;
pub mod error;
pub mod manager;
pub mod provider;
pub mod registry;
pub mod runtime;
pub mod telemetry;

pub use backoff::ReconnectPolicy;
pub use builtin::register_builtins;
pub use config::{BusConfig, FailurePolicy, LayerConfig, RuntimeConfig};
pub use error::RuntimeError;
pub use manager::{DecisionManager, InputManager, OutputManager, ProviderReport};
pub use provider::{
    DecisionProvider, Dependencies, InputProvider, InputStream, OutputProvider, ProviderContext,
    RawItem,
};
pub use registry::{ProviderDescriptor, ProviderFactory, ProviderRegistry};
pub use runtime::{Runtime, RuntimeState, ShutdownReport};
pub use telemetry::{init_tracing, TelemetryConfig};
