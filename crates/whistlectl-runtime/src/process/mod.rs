//! Process management for proxy instances.
//!
//! # Structure
//!
//! - `launcher` - Spawn a command and wait for its success marker
//! - `lookup` - Find processes by listening port or command-line tag
//! - `shutdown` - SIGTERM → SIGKILL by PID
//! - `terminator` - `ProcessTerminator` seam used by the controller

mod launcher;
mod lookup;
pub mod shutdown;
mod stream;
mod terminator;

pub use launcher::{
    BoundAddressMarker, CommandOutput, LaunchOutcome, SuccessPredicate, launch, run_to_completion,
};
pub use lookup::{ProcessMatch, pids_listening_on, processes_matching_tag};
pub use shutdown::{kill_pid, pid_exists};
pub use terminator::{ProcessTerminator, SystemTerminator};

#[cfg(test)]
pub use terminator::MockProcessTerminator;
