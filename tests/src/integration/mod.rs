//! Cross-crate integration suites.

pub mod dispatch;
pub mod pipeline;
pub mod shutdown;
pub mod streaming;
pub mod topology;
