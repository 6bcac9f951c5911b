//! Start command handler.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;
use whistlectl_core::EnvSnapshot;

use crate::commands::InstanceArgs;

/// Arguments of `whistlectl start`.
#[derive(Debug, Clone, Default)]
pub struct StartArgs {
    pub instance: InstanceArgs,
    pub port: Option<u16>,
    pub no_clear_port: bool,
    pub launch_timeout: Option<u64>,
    pub health_timeout: Option<u64>,
}

/// Execute the start command.
///
/// Launches the proxy, waits until its status endpoint answers and prints
/// the instance's port and namespace. The proxy keeps running after this
/// process exits.
pub async fn execute(binary: Option<&str>, args: StartArgs) -> Result<()> {
    let env = EnvSnapshot::capture();
    let mut settings = super::settings(&env, binary).with_clear_port_before_start(!args.no_clear_port);
    if let Some(secs) = args.launch_timeout {
        settings = settings.with_launch_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = args.health_timeout {
        settings = settings.with_health_timeout(Duration::from_secs(secs));
    }

    let mut options = args.instance.options();
    if let Some(port) = args.port {
        options = options.with_port(port);
    }
    debug!(?options, ?settings, "Starting proxy");

    let mut controller = super::controller(options, settings, env)?;
    controller.start().await.context("Failed to start proxy")?;

    let port = controller
        .port()
        .context("Proxy started without a resolved port")?;
    println!("Proxy ready on http://127.0.0.1:{port}");
    println!("  seq id:    {}", controller.seq_id());
    match controller.namespace() {
        Some(ns) => println!("  namespace: {ns}"),
        None => println!("  namespace: (shared)"),
    }
    println!();
    println!("Stop it with: whistlectl stop --port {port}");

    Ok(())
}
