//! Subcommand handlers.
//!
//! Each handler builds its own [`ProxyController`] from the captured
//! environment; the CLI is one-shot and keeps no state between invocations.

pub mod rules;
pub mod start;
pub mod status;
pub mod stop;

use std::sync::Arc;

use anyhow::{Context, Result};
use whistlectl_core::{ControllerOptions, ControllerSettings, EnvSnapshot};
use whistlectl_runtime::{ProxyController, SystemTerminator};

/// Settings from the environment, with the `--binary` flag applied on top.
pub fn settings(env: &EnvSnapshot, binary: Option<&str>) -> ControllerSettings {
    let settings = ControllerSettings::from_env(env);
    match binary {
        Some(binary) => settings.with_binary(binary),
        None => settings,
    }
}

/// Build a controller wired to the real process table.
pub fn controller(
    options: ControllerOptions,
    settings: ControllerSettings,
    env: EnvSnapshot,
) -> Result<ProxyController> {
    ProxyController::with_parts(options, settings, env, Arc::new(SystemTerminator))
        .context("Failed to create proxy controller")
}

#[cfg(test)]
mod tests {
    use super::*;
    use whistlectl_core::BIN_ENV;

    #[test]
    fn test_binary_flag_beats_env() {
        let env = EnvSnapshot::from_pairs([(BIN_ENV, "/env/w2")]);
        assert_eq!(settings(&env, Some("/flag/w2")).binary, "/flag/w2");
        assert_eq!(settings(&env, None).binary, "/env/w2");
    }
}
