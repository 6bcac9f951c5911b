//! Launch the proxy and wait for its success marker.
//!
//! `w2 start` prints the address it bound (`127.0.0.1:<port>`) and then
//! daemonizes. Detection is a pluggable [`SuccessPredicate`] over merged
//! stdout/stderr lines so tests can drive a fake process.

use std::collections::VecDeque;
use std::process::ExitStatus;
use std::time::Duration;

#[cfg(unix)]
use nix::sys::signal::{Signal, killpg};
#[cfg(unix)]
use nix::unistd::Pid;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, info, warn};
use whistlectl_core::{ControllerError, Result};

use super::stream::spawn_stream_reader;
use crate::command::LaunchCommand;

/// Output kept for error messages.
const MAX_TAIL_LINES: usize = 50;

/// How long output may keep arriving after the process exits.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Bound on reaping a killed launch process.
const ABORT_REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Decides whether an output line means the launch succeeded.
pub trait SuccessPredicate: Send + Sync {
    fn is_success(&self, line: &str) -> bool;
}

impl<F> SuccessPredicate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_success(&self, line: &str) -> bool {
        self(line)
    }
}

/// Matches the line in which the proxy announces `127.0.0.1:<port>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundAddressMarker {
    needle: String,
}

impl BoundAddressMarker {
    pub fn new(port: u16) -> Self {
        Self {
            needle: format!("127.0.0.1:{port}"),
        }
    }
}

impl SuccessPredicate for BoundAddressMarker {
    fn is_success(&self, line: &str) -> bool {
        line.contains(&self.needle)
    }
}

/// A launch that printed its success marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    /// The line the predicate matched.
    pub matched_line: String,
    /// Output seen up to and including the matched line.
    pub output: String,
}

/// Captured result of a command run to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub success: bool,
    /// Combined stdout then stderr.
    pub output: String,
}

/// Rolling buffer of the last output lines.
#[derive(Debug, Default)]
struct OutputTail {
    lines: VecDeque<String>,
}

impl OutputTail {
    fn push(&mut self, line: &str) {
        if self.lines.len() == MAX_TAIL_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    fn joined(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

/// Spawn `command` and resolve once `predicate` matches an output line.
///
/// # Errors
///
/// - `LaunchProcess` if the command cannot be spawned, exits non-zero before
///   the marker, or exits and its output ends without the marker.
/// - `LaunchTimeout` if the marker does not appear within `launch_timeout`.
///   The process and its process group are killed and reaped first.
///
/// On success the child is detached: a background task reaps it and keeps
/// draining its pipes. No handle is returned.
pub async fn launch(
    command: &LaunchCommand,
    predicate: &dyn SuccessPredicate,
    launch_timeout: Duration,
) -> Result<LaunchOutcome> {
    let command_line = command.to_string();
    info!(command = %command_line, "Launching proxy");

    let mut child = command
        .to_command()
        .spawn()
        .map_err(|e| ControllerError::LaunchProcess {
            command: command_line.clone(),
            code: None,
            output: format!("failed to spawn: {e}"),
        })?;
    let pid = child.id();

    let (tx, mut rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        spawn_stream_reader(stdout, pid, "stdout", tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_stream_reader(stderr, pid, "stderr", tx.clone());
    }
    drop(tx);

    let mut tail = OutputTail::default();
    let mut exit: Option<ExitStatus> = None;
    let mut streams_open = true;
    let mut deadline = Instant::now() + launch_timeout;

    loop {
        tokio::select! {
            line = rx.recv(), if streams_open => {
                let Some(line) = line else {
                    streams_open = false;
                    if exit.is_some() {
                        break;
                    }
                    continue;
                };
                tail.push(&line);
                if predicate.is_success(&line) {
                    info!(pid = ?pid, line = %line, "Proxy reported success");
                    if exit.is_none() {
                        detach(child, pid);
                    }
                    return Ok(LaunchOutcome {
                        matched_line: line,
                        output: tail.joined(),
                    });
                }
            }
            status = child.wait(), if exit.is_none() => {
                let status = status.map_err(|e| ControllerError::LaunchProcess {
                    command: command_line.clone(),
                    code: None,
                    output: format!("failed to wait for process: {e}"),
                })?;
                debug!(pid = ?pid, status = %status, "Launch process exited");
                exit = Some(status);
                if !streams_open {
                    break;
                }
                // Give already-written output a moment to arrive.
                deadline = deadline.min(Instant::now() + EXIT_DRAIN_GRACE);
            }
            () = sleep_until(deadline) => {
                if exit.is_some() {
                    break;
                }
                warn!(pid = ?pid, command = %command_line, "No success marker within {:?}", launch_timeout);
                abort(child, pid).await;
                return Err(ControllerError::LaunchTimeout {
                    command: command_line,
                    timeout: launch_timeout,
                });
            }
        }
    }

    let code = exit.and_then(|s| s.code());
    let mut output = tail.joined();
    if output.is_empty() {
        output = "process exited without printing the success marker".to_string();
    }
    Err(ControllerError::LaunchProcess {
        command: command_line,
        code,
        output,
    })
}

/// Run `command` to completion and capture its output.
///
/// Used for one-shot subcommands such as `add`, where only the exit status
/// and text are observable.
pub async fn run_to_completion(command: &LaunchCommand, limit: Duration) -> Result<CommandOutput> {
    let command_line = command.to_string();
    debug!(command = %command_line, "Running command");

    let child = command
        .to_command()
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ControllerError::LaunchProcess {
            command: command_line.clone(),
            code: None,
            output: format!("failed to spawn: {e}"),
        })?;

    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(ControllerError::LaunchTimeout {
                command: command_line,
                timeout: limit,
            });
        }
    };

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }

    Ok(CommandOutput {
        code: output.status.code(),
        success: output.status.success(),
        output: text.trim_end().to_string(),
    })
}

/// Kill a launch that never reported success, then reap it.
///
/// The child leads its own process group, so on Unix the whole group is
/// killed, including anything a start script forked.
async fn abort(mut child: Child, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pgid) = pid.and_then(|p| i32::try_from(p).ok()) {
        if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            debug!(pid = ?pid, error = %e, "Failed to kill launch process group");
        }
    }

    if let Err(e) = child.start_kill() {
        debug!(pid = ?pid, error = %e, "Failed to kill launch process");
    }

    match timeout(ABORT_REAP_TIMEOUT, child.wait()).await {
        Ok(Ok(status)) => debug!(pid = ?pid, status = %status, "Killed launch process"),
        Ok(Err(e)) => warn!(pid = ?pid, error = %e, "Failed to reap killed launch process"),
        Err(_) => warn!(pid = ?pid, "Killed launch process did not exit in time"),
    }
}

/// Reap the child in the background; the proxy manages its own lifetime.
fn detach(mut child: Child, pid: Option<u32>) {
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => debug!(pid = ?pid, status = %status, "Detached launch process exited"),
            Err(e) => debug!(pid = ?pid, error = %e, "Failed to reap detached launch process"),
        }
    });
}
