//! Controller configuration and environment override resolution.
//!
//! Environment variables are never read ad hoc. They are captured once into
//! an [`EnvSnapshot`] and passed to the resolution functions, so tests can
//! simulate overrides without touching real process state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Environment variable that forces the proxy port.
pub const PORT_ENV: &str = "WHISTLE_PORT";

/// Environment variable that forces the instance sequence id.
pub const SEQ_ID_ENV: &str = "WHISTLE_SEQ_ID";

/// Environment variable that overrides the proxy binary.
pub const BIN_ENV: &str = "WHISTLE_BIN";

/// Tag shared by every isolated instance this tool starts.
///
/// It is embedded in each namespace name and therefore in each instance's
/// command line, which is what `stop_all()` matches on.
pub const CONTROLLER_TAG: &str = "auto-whistle-sdk";

/// Default proxy binary name.
pub const DEFAULT_BINARY: &str = "w2";

/// First port probed during auto-discovery.
pub const DEFAULT_BASE_PORT: u16 = 9421;

/// Number of ports probed during auto-discovery.
pub const DEFAULT_PORT_RANGE: u16 = 100;

/// Status endpoint polled by the health checker.
pub const DEFAULT_STATUS_PATH: &str = "/cgi-bin/server-info";

/// Immutable copy of the environment variables the controller cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the relevant variables from the current process environment.
    pub fn capture() -> Self {
        let vars = [PORT_ENV, SEQ_ID_ENV, BIN_ENV]
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|v| ((*key).to_string(), v)))
            .collect();
        Self { vars }
    }

    /// An empty snapshot (no overrides).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up a variable; empty values count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// The port override, if set to a usable port number.
    ///
    /// Unparsable or zero values are ignored with a warning.
    pub fn port_override(&self) -> Option<u16> {
        let raw = self.get(PORT_ENV)?;
        match raw.trim().parse::<u16>() {
            Ok(0) | Err(_) => {
                warn!(value = %raw, "Ignoring invalid {} override", PORT_ENV);
                None
            }
            Ok(port) => Some(port),
        }
    }

    /// The sequence id override.
    pub fn seq_id_override(&self) -> Option<&str> {
        self.get(SEQ_ID_ENV)
    }

    /// The proxy binary override.
    pub fn binary_override(&self) -> Option<&str> {
        self.get(BIN_ENV)
    }
}

/// Per-instance hints supplied by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ControllerOptions {
    /// Caller-chosen sequence id (env override still wins).
    pub seq_id: Option<String>,
    /// Caller-chosen port (env override still wins).
    pub port: Option<u16>,
    /// Share state with an already-running default instance instead of isolating.
    pub use_shared_namespace: bool,
    /// Pass `--force` when installing rules so an existing rule set is replaced.
    pub force_override: bool,
}

impl ControllerOptions {
    /// Options with no hints: auto port, generated seq id, isolated namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sequence id.
    #[must_use]
    pub fn with_seq_id(mut self, seq_id: impl Into<String>) -> Self {
        self.seq_id = Some(seq_id.into());
        self
    }

    /// Set the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Share the default namespace.
    #[must_use]
    pub const fn with_shared_namespace(mut self, shared: bool) -> Self {
        self.use_shared_namespace = shared;
        self
    }

    /// Force rule installs to override existing rules.
    #[must_use]
    pub const fn with_force_override(mut self, force: bool) -> Self {
        self.force_override = force;
        self
    }
}

/// Tunables for the launcher, allocator and health checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Proxy binary (name on `PATH` or absolute path).
    pub binary: String,
    /// First port probed during auto-discovery.
    pub base_port: u16,
    /// How many ports to probe before giving up.
    pub port_range: u16,
    /// How long to wait for the launch success marker.
    pub launch_timeout: Duration,
    /// Total bound on health polling.
    pub health_timeout: Duration,
    /// Delay between health probes.
    pub poll_interval: Duration,
    /// Timeout of a single health probe request.
    pub probe_timeout: Duration,
    /// Path of the status endpoint.
    pub status_path: String,
    /// Kill whatever listens on the resolved port before launching.
    ///
    /// This will terminate unrelated processes occupying the port. Disable in
    /// shared environments.
    pub clear_port_before_start: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            base_port: DEFAULT_BASE_PORT,
            port_range: DEFAULT_PORT_RANGE,
            launch_timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            probe_timeout: Duration::from_secs(2),
            status_path: DEFAULT_STATUS_PATH.to_string(),
            clear_port_before_start: true,
        }
    }
}

impl ControllerSettings {
    /// Defaults with environment overrides applied.
    pub fn from_env(env: &EnvSnapshot) -> Self {
        let mut settings = Self::default();
        if let Some(bin) = env.binary_override() {
            settings.binary = bin.to_string();
        }
        settings
    }

    /// Set the proxy binary.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set the auto-discovery base port.
    #[must_use]
    pub const fn with_base_port(mut self, base_port: u16) -> Self {
        self.base_port = base_port;
        self
    }

    /// Set the number of ports probed.
    #[must_use]
    pub const fn with_port_range(mut self, range: u16) -> Self {
        self.port_range = range;
        self
    }

    /// Set the launch marker timeout.
    #[must_use]
    pub const fn with_launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }

    /// Set the health polling bound.
    #[must_use]
    pub const fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// Set the health polling interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Enable or disable the pre-launch port clear.
    #[must_use]
    pub const fn with_clear_port_before_start(mut self, clear: bool) -> Self {
        self.clear_port_before_start = clear;
        self
    }
}
