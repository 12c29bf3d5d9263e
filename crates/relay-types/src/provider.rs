//! # Provider Status
//!
//! Lifecycle states reported by the layer managers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one provider instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderStatus {
    /// Constructed, not started.
    Loaded,
    /// Setup / pump running.
    Running,
    /// Input pump is waiting to reconnect.
    Reconnecting,
    /// A lifecycle step failed.
    Failed,
    /// Cleaned up.
    Stopped,
}

impl ProviderStatus {
    /// Whether the provider should receive work.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Reconnecting)
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Loaded => "loaded",
            Self::Running => "running",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}
