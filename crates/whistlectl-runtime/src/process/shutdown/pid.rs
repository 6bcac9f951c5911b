//! Kill processes by PID with no `Child` handle.
//!
//! The proxy daemonizes itself, so every instance we stop was discovered by
//! port or by tag rather than spawned by us.

use std::io;

#[cfg(unix)]
use std::time::Duration;
#[cfg(unix)]
use tokio::time::sleep;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Kill a process by PID with SIGTERM → SIGKILL escalation.
///
/// # Strategy
/// 1. Send SIGTERM
/// 2. Poll for up to 2 seconds to verify process exit
/// 3. If still alive, send SIGKILL
/// 4. Poll again for up to 2 seconds to verify exit
///
/// # Returns
/// - `Ok(())` if process was killed or already gone
/// - `Err` if kill operations fail (excluding ESRCH)
pub async fn kill_pid(pid: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        kill_pid_unix(pid).await
    }

    #[cfg(not(unix))]
    {
        kill_pid_sysinfo(pid)
    }
}

#[cfg(unix)]
fn to_nix_pid(pid: u32) -> io::Result<Pid> {
    i32::try_from(pid)
        .map(Pid::from_raw)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {pid}")))
}

#[cfg(unix)]
async fn kill_pid_unix(pid: u32) -> io::Result<()> {
    let nix_pid = to_nix_pid(pid)?;

    // Phase 1: SIGTERM
    if let Err(e) = signal::kill(nix_pid, Signal::SIGTERM) {
        if e == Errno::ESRCH {
            // Already gone
            return Ok(());
        }
        return Err(io::Error::other(e));
    }

    if wait_for_exit(nix_pid).await {
        return Ok(());
    }

    // Phase 2: SIGKILL
    if let Err(e) = signal::kill(nix_pid, Signal::SIGKILL) {
        if e == Errno::ESRCH {
            return Ok(());
        }
        return Err(io::Error::other(e));
    }

    if wait_for_exit(nix_pid).await {
        return Ok(());
    }

    // If we get here, process didn't exit even after SIGKILL (rare)
    Err(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("process {pid} did not exit after SIGKILL"),
    ))
}

/// Poll for up to 2 seconds.
#[cfg(unix)]
async fn wait_for_exit(pid: Pid) -> bool {
    for _ in 0..20 {
        sleep(Duration::from_millis(100)).await;

        if has_exited(pid) {
            return true;
        }
    }
    false
}

/// Gone, or a zombie waiting for its parent to reap it.
#[cfg(unix)]
fn has_exited(pid: Pid) -> bool {
    match signal::kill(pid, None) {
        Err(Errno::ESRCH) => true,
        // Still alive, or exists but we lack permission
        Ok(()) | Err(_) => is_zombie(pid),
    }
}

#[cfg(unix)]
fn is_zombie(pid: Pid) -> bool {
    use sysinfo::{ProcessStatus, ProcessesToUpdate, System};

    let Ok(raw) = u32::try_from(pid.as_raw()) else {
        return false;
    };
    let target = sysinfo::Pid::from_u32(raw);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    system
        .process(target)
        .is_some_and(|p| p.status() == ProcessStatus::Zombie)
}

#[cfg(not(unix))]
fn kill_pid_sysinfo(pid: u32) -> io::Result<()> {
    use sysinfo::{Pid, ProcessesToUpdate, System};

    let mut system = System::new();
    let target = Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);

    match system.process(target) {
        None => Ok(()),
        Some(process) if process.kill() => Ok(()),
        Some(_) => Err(io::Error::other(format!("failed to kill process {pid}"))),
    }
}

/// Check if a PID exists.
///
/// Uses `kill` with null signal which doesn't send a signal but checks existence.
#[cfg(unix)]
pub fn pid_exists(pid: u32) -> bool {
    let Ok(nix_pid) = to_nix_pid(pid) else {
        return false;
    };
    match signal::kill(nix_pid, None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false, // No such process
        Err(_) => true,             // Process exists but we lack permission
    }
}

#[cfg(not(unix))]
pub fn pid_exists(pid: u32) -> bool {
    use sysinfo::{Pid, ProcessesToUpdate, System};

    let mut system = System::new();
    let target = Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    system.process(target).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;

    #[tokio::test]
    #[cfg(unix)]
    async fn kill_pid_handles_already_gone() {
        // Use a PID that's very unlikely to exist
        let result = kill_pid(999_999).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn kill_pid_terminates_process() {
        let mut child = Command::new("sleep")
            .arg("60")
            .spawn()
            .expect("failed to spawn sleep");

        let pid = child.id().expect("no PID");

        // The child stays a zombie until we wait on it; that counts as exited.
        let started = std::time::Instant::now();
        kill_pid(pid).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));

        let _ = child.wait().await;
        assert!(!pid_exists(pid));
    }

    #[test]
    #[cfg(unix)]
    fn pid_exists_for_self() {
        assert!(pid_exists(std::process::id()));
    }

    #[test]
    #[cfg(unix)]
    fn pid_exists_false_for_impossible_pid() {
        assert!(!pid_exists(999_999));
    }
}
