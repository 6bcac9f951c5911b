//! Port allocation for proxy instances.
//!
//! Resolution order: `WHISTLE_PORT` override, then the caller's port, then
//! the first free port probed upward from the base port.
//!
//! Clearing a port is a separate, destructive step: [`PortAllocator::force_clear_port`]
//! kills *whatever* listens on the port, including processes this tool did
//! not start.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use whistlectl_core::{ControllerError, ControllerSettings, EnvSnapshot, Result};

use crate::process::ProcessTerminator;

/// Check if a port is available by attempting to bind to it.
/// The listener is dropped immediately, releasing the port.
pub async fn is_port_available(port: u16) -> bool {
    match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => listener.local_addr().is_ok(),
        Err(_) => false,
    }
}

/// Find the first free port in `base..base + range`.
pub async fn find_available_port(base_port: u16, range: u16) -> Result<u16> {
    for offset in 0..range {
        let Some(port) = base_port.checked_add(offset) else {
            break;
        };
        if port == 0 {
            continue;
        }

        if is_port_available(port).await {
            // Double-check availability to narrow the race with other probers
            sleep(Duration::from_millis(10)).await;
            if is_port_available(port).await {
                debug!(port, "Allocated available port");
                return Ok(port);
            }
            debug!(port, "Port became unavailable, continuing");
        } else {
            debug!(port, "Port unavailable on system, skipping");
        }
    }

    Err(ControllerError::PortExhausted {
        base: base_port,
        range,
    })
}

/// Resolves and clears ports for one controller.
#[derive(Clone)]
pub struct PortAllocator {
    base_port: u16,
    range: u16,
    terminator: Arc<dyn ProcessTerminator>,
}

impl std::fmt::Debug for PortAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortAllocator")
            .field("base_port", &self.base_port)
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

impl PortAllocator {
    pub fn new(base_port: u16, range: u16, terminator: Arc<dyn ProcessTerminator>) -> Self {
        Self {
            base_port,
            range,
            terminator,
        }
    }

    pub fn from_settings(settings: &ControllerSettings, terminator: Arc<dyn ProcessTerminator>) -> Self {
        Self::new(settings.base_port, settings.port_range, terminator)
    }

    /// Resolve the port to launch on.
    ///
    /// An environment override wins unconditionally; an explicit port is
    /// returned as-is even if something listens on it (see
    /// [`Self::force_clear_port`]).
    pub async fn resolve_port(&self, env: &EnvSnapshot, requested: Option<u16>) -> Result<u16> {
        if let Some(port) = env.port_override() {
            info!(port, "Using port from environment override");
            return Ok(port);
        }

        if let Some(port) = requested.filter(|p| *p > 0) {
            info!(port, "Using requested port");
            return Ok(port);
        }

        let port = find_available_port(self.base_port, self.range).await?;
        info!(port, "Using discovered port");
        Ok(port)
    }

    /// Kill every process listening on `port`.
    ///
    /// Destructive: this also stops unrelated programs and other
    /// controllers' instances bound to the port.
    pub async fn force_clear_port(&self, port: u16) -> Result<Vec<u32>> {
        warn!(port, "Clearing port: any process listening on it will be killed");
        let pids = self.terminator.kill_port(port).await?;
        if !pids.is_empty() {
            info!(port, pids = ?pids, "Cleared port");
        }
        Ok(pids)
    }
}
