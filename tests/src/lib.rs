//! # Relay Test Suite
//!
//! Unified test crate exercising the workspace crates together.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── support.rs        # Recording handlers and timeouts
//! └── integration/
//!     ├── dispatch.rs   # Priority tiers, isolation, propagation, off()
//!     ├── streaming.rs  # Backpressure policies and session ordering
//!     ├── topology.rs   # Architectural validator on a live bus
//!     ├── shutdown.rs   # Bounded cleanup with hanging handlers
//!     └── pipeline.rs   # Runtime end-to-end with built-in providers
//!
//! tests/benches/
//! └── relay_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p relay-tests
//!
//! # By suite
//! cargo test -p relay-tests integration::dispatch::
//! cargo test -p relay-tests integration::pipeline::
//!
//! # Benchmarks
//! cargo bench -p relay-tests
//! ```

#![allow(dead_code)]

pub mod integration;
pub mod support;
