//! Runtime for controlling proxy instances.
//!
//! This crate does the process and network work behind
//! [`ProxyController`]:
//!
//! - [`ports`] - port resolution and discovery
//! - [`process`] - launch with output-marker detection, lookup and termination
//! - [`health`] - status endpoint polling
//! - [`controller`] - the lifecycle state machine tying them together
//!
//! Domain types and errors live in `whistlectl-core`.

#![deny(unsafe_code)]

pub mod command;
pub mod controller;
pub mod health;
pub mod ports;
pub mod process;

pub use command::LaunchCommand;
pub use controller::{InstallReport, ProxyController};
pub use health::{HealthChecker, HealthStatus};
pub use ports::{PortAllocator, find_available_port, is_port_available};
pub use process::{
    BoundAddressMarker, CommandOutput, LaunchOutcome, ProcessMatch, ProcessTerminator,
    SuccessPredicate, SystemTerminator, kill_pid, launch, pid_exists, pids_listening_on,
    processes_matching_tag, run_to_completion,
};

