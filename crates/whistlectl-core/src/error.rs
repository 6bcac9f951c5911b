//! Error taxonomy for controller operations.
//!
//! Every variant carries enough context (command attempted, URL probed,
//! timeout value) to diagnose a failure without re-running with verbose
//! logging.

use std::time::Duration;
use thiserror::Error;

use crate::state::LifecycleState;

/// Errors raised by the lifecycle controller and its collaborators.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// No free port was found in the probed range.
    #[error("No available ports in range {base}-{}", .base.saturating_add(.range.saturating_sub(1)))]
    PortExhausted { base: u16, range: u16 },

    /// The start command could not be spawned, or exited before announcing success.
    #[error("Command `{command}` failed (exit code: {}): {output}", display_code(.code))]
    LaunchProcess {
        command: String,
        code: Option<i32>,
        output: String,
    },

    /// The start command never printed its success marker.
    #[error("Command `{command}` did not report success within {timeout:?}")]
    LaunchTimeout { command: String, timeout: Duration },

    /// The instance was spawned but its status endpoint never answered.
    #[error("Proxy is not started! checkURL={url}, timeout={timeout:?}, err={last_error}")]
    HealthCheckTimeout {
        url: String,
        timeout: Duration,
        last_error: String,
    },

    /// Rule content is missing required fields.
    #[error("Cannot generate proxy rules: {0}")]
    ConfigValidation(String),

    /// The rule install command exited non-zero; whether rules were applied is unknown.
    #[error("Rule install `{command}` exited with code {}; result is ambiguous: {output}", display_code(.code))]
    InstallAmbiguous {
        command: String,
        code: Option<i32>,
        output: String,
    },

    /// An operation needed a port but none was supplied or stored.
    #[error("Could not check because port is unknown")]
    PortUnknown,

    /// The controller is not in a state that allows the operation.
    #[error("Cannot {operation} while controller is {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    /// Finding or signalling a process failed.
    #[error("Failed to terminate {target}: {reason}")]
    Terminate { target: String, reason: String },

    /// Filesystem operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Rule file serialization failed.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ControllerError {
    /// Create a `Terminate` error from any displayable reason.
    pub fn terminate(target: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Terminate {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error came from the launch stage of `start()`.
    pub const fn is_launch_failure(&self) -> bool {
        matches!(self, Self::LaunchProcess { .. } | Self::LaunchTimeout { .. })
    }
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, ControllerError>;
