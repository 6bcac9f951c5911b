//! Stop and stop-all command handlers.

use anyhow::{Context, Result};
use whistlectl_core::{CONTROLLER_TAG, ControllerOptions, EnvSnapshot, PORT_ENV};

/// Stop the instance on `port`.
///
/// Falls back to `WHISTLE_PORT`. With neither there is nothing to target;
/// this reports and succeeds.
pub async fn execute(binary: Option<&str>, port: Option<u16>) -> Result<()> {
    let env = EnvSnapshot::capture();
    let Some(port) = port.or_else(|| env.port_override()) else {
        println!("No port given and {PORT_ENV} is not set; nothing to stop.");
        return Ok(());
    };

    let settings = super::settings(&env, binary);
    let mut controller = super::controller(ControllerOptions::new(), settings, env)?;

    controller
        .stop(Some(port))
        .await
        .with_context(|| format!("Failed to stop proxy on port {port}"))?;
    println!("Stopped proxy on port {port}");
    Ok(())
}

/// Stop every instance carrying the controller tag.
pub async fn execute_all(binary: Option<&str>) -> Result<()> {
    let env = EnvSnapshot::capture();
    let settings = super::settings(&env, binary);
    let mut controller = super::controller(ControllerOptions::new(), settings, env)?;

    controller
        .stop_all()
        .await
        .context("Failed to stop proxy instances")?;
    println!("Stopped all instances tagged `{CONTROLLER_TAG}`");
    Ok(())
}
