//! Instance identity: sequence id, port and namespace mode.

use chrono::Local;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{ControllerOptions, EnvSnapshot};

/// Identity of one controller instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceIdentity {
    /// Unique label, stable for the controller's lifetime.
    pub seq_id: String,
    /// Port the instance binds to; set once `start()` resolves it.
    pub port: Option<u16>,
    /// Share the proxy's default state instead of an isolated namespace.
    pub use_shared_namespace: bool,
}

impl InstanceIdentity {
    /// Resolve an identity from caller options and the environment snapshot.
    ///
    /// The port is kept as a hint only; the port allocator applies the
    /// environment override when `start()` runs.
    pub fn resolve(options: &ControllerOptions, env: &EnvSnapshot) -> Self {
        Self {
            seq_id: resolve_seq_id(options.seq_id.as_deref(), env),
            port: options.port.filter(|p| *p > 0),
            use_shared_namespace: options.use_shared_namespace,
        }
    }
}

/// Resolve the sequence id: environment override, then caller value, then a
/// generated `timestamp-random` fallback.
pub fn resolve_seq_id(requested: Option<&str>, env: &EnvSnapshot) -> String {
    if let Some(seq_id) = env.seq_id_override() {
        return seq_id.to_string();
    }

    if let Some(seq_id) = requested.filter(|s| !s.is_empty()) {
        return seq_id.to_string();
    }

    generate_seq_id()
}

/// Generate a fallback sequence id such as `2026-10-14-3-27-512-8841`
/// (year, month, hour, minute, second, millis, random).
pub fn generate_seq_id() -> String {
    let now = Local::now();
    let salt: u16 = rand::thread_rng().gen_range(0..=9999);
    format!("{}-{salt}", now.format("%Y-%-m-%-H-%-M-%-S-%3f"))
}
