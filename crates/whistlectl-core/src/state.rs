//! Lifecycle state machine for a single controller.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a controller is in its start/stop cycle.
///
/// ```text
/// Idle -> Starting -> AwaitingHealth -> Ready -> Stopped
///            |              |
///            +---> Failed <-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Constructed, nothing started yet.
    Idle,
    /// Resolving the port and spawning the proxy.
    Starting,
    /// Spawned; polling the status endpoint.
    AwaitingHealth,
    /// Status endpoint answered; rules may be installed.
    Ready,
    /// Instance was stopped. Terminal.
    Stopped,
    /// A start stage failed. Terminal.
    Failed,
}

impl LifecycleState {
    /// Whether `start()` may be called from this state.
    ///
    /// `Ready` is accepted so a controller can re-start on the same port;
    /// the port allocator clears the previous instance first.
    pub const fn can_start(self) -> bool {
        matches!(self, Self::Idle | Self::Ready)
    }

    /// Whether no further start is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    /// Validate a transition.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle | Self::Ready, Self::Starting)
                | (Self::Starting, Self::AwaitingHealth | Self::Failed)
                | (Self::AwaitingHealth, Self::Ready | Self::Failed)
                | (Self::Ready | Self::Idle, Self::Stopped)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Starting => write!(f, "Starting"),
            Self::AwaitingHealth => write!(f, "AwaitingHealth"),
            Self::Ready => write!(f, "Ready"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}
