//! Process termination for discovered proxy instances.

mod pid;

pub use pid::{kill_pid, pid_exists};
