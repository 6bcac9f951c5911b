//! Termination seam: kill-by-port and kill-by-tag.
//!
//! The controller never holds a handle to the daemonized proxy, so stopping
//! is always "signal by discovery". The trait lets tests substitute a fake
//! that records calls instead of touching real processes.

use async_trait::async_trait;
use tracing::{debug, info, warn};
use whistlectl_core::{ControllerError, Result};

use super::lookup::{pids_listening_on, processes_matching_tag};
use super::shutdown::kill_pid;

/// OS process-management collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessTerminator: Send + Sync {
    /// Kill every process listening on `port`. Returns the PIDs signalled.
    async fn kill_port(&self, port: u16) -> Result<Vec<u32>>;

    /// Kill every process whose command line contains `tag`. Returns the PIDs signalled.
    async fn kill_tagged(&self, tag: &str) -> Result<Vec<u32>>;
}

/// Real terminator backed by `lsof`/`ss`, `sysinfo` and signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTerminator;

#[async_trait]
impl ProcessTerminator for SystemTerminator {
    async fn kill_port(&self, port: u16) -> Result<Vec<u32>> {
        let target = format!("port {port}");
        let pids = pids_listening_on(port)
            .await
            .map_err(|e| ControllerError::terminate(&target, e))?;

        if pids.is_empty() {
            debug!(port, "No process listening");
            return Ok(pids);
        }

        info!(port, pids = ?pids, "Killing processes listening on port");
        kill_all(&target, &pids).await?;
        Ok(pids)
    }

    async fn kill_tagged(&self, tag: &str) -> Result<Vec<u32>> {
        let target = format!("processes tagged `{tag}`");
        let matches = processes_matching_tag(tag)
            .await
            .map_err(|e| ControllerError::terminate(&target, e))?;

        if matches.is_empty() {
            debug!(%tag, "No tagged processes running");
            return Ok(Vec::new());
        }

        for m in &matches {
            debug!(pid = m.pid, command = %m.command_line, "Killing tagged process");
        }

        let pids: Vec<u32> = matches.iter().map(|m| m.pid).collect();
        kill_all(&target, &pids).await?;
        Ok(pids)
    }
}

/// Kill each PID, attempting all of them before reporting failures.
async fn kill_all(target: &str, pids: &[u32]) -> Result<()> {
    let mut failures = Vec::new();

    for &pid in pids {
        if let Err(e) = kill_pid(pid).await {
            warn!(pid, error = %e, "Failed to kill process");
            failures.push(format!("pid {pid}: {e}"));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ControllerError::terminate(target, failures.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn kill_all_of_nothing_succeeds() {
        assert!(kill_all("nothing", &[]).await.is_ok());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn kill_all_tolerates_vanished_pids() {
        assert!(kill_all("gone", &[999_999]).await.is_ok());
    }

    #[tokio::test]
    async fn kill_tagged_with_unused_tag_is_noop() {
        let pids = SystemTerminator
            .kill_tagged("whistlectl-tag-that-matches-nothing-7f3a")
            .await
            .unwrap();
        assert!(pids.is_empty());
    }
}
