//! Status command handler.

use std::time::Duration;

use anyhow::Result;
use whistlectl_core::{ControllerOptions, EnvSnapshot};

/// Poll the instance on `port` for up to `timeout_secs`.
pub async fn execute(binary: Option<&str>, port: u16, timeout_secs: u64) -> Result<()> {
    let env = EnvSnapshot::capture();
    let settings = super::settings(&env, binary).with_health_timeout(Duration::from_secs(timeout_secs));
    let controller = super::controller(ControllerOptions::new(), settings, env)?;

    let url = controller.health_checker().status_url(port);
    match controller.verify(Some(port)).await {
        Ok(()) => {
            println!("Proxy is up: {url}");
            Ok(())
        }
        Err(e) => {
            println!("Proxy is not answering: {url}");
            Err(e.into())
        }
    }
}
