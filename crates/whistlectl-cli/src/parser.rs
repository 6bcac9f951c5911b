//! Root CLI structure and global options.

use clap::Parser;

use crate::commands::Commands;

/// Start, stop and configure whistle proxy instances.
#[derive(Parser, Debug)]
#[command(name = "whistlectl")]
#[command(about = "Control whistle proxy instances")]
#[command(version)]
pub struct Cli {
    /// Proxy binary to run (defaults to `w2`, or `WHISTLE_BIN`)
    #[arg(long, global = true, env = "WHISTLE_BIN")]
    pub binary: Option<String>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default log filter for this invocation; `RUST_LOG` takes precedence.
    pub const fn default_log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }
}
