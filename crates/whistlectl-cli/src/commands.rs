//! Subcommand definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use whistlectl_core::{ControllerOptions, RuleFileOptions, RuleSet};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a proxy instance and wait until it answers
    Start {
        #[command(flatten)]
        instance: InstanceArgs,

        /// Port to listen on (first free port from 9421 when omitted)
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not kill whatever already listens on the port
        #[arg(long)]
        no_clear_port: bool,

        /// Seconds to wait for the start command to report its address
        #[arg(long, value_name = "SECS")]
        launch_timeout: Option<u64>,

        /// Seconds to wait for the status endpoint to answer
        #[arg(long, value_name = "SECS")]
        health_timeout: Option<u64>,
    },

    /// Stop the instance listening on a port
    Stop {
        /// Port of the instance to stop
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Stop every isolated instance started by this tool on the host
    StopAll,

    /// Check that an instance answers on its status endpoint
    Status {
        /// Port of the instance to check
        #[arg(short, long)]
        port: u16,

        /// Seconds to keep polling before giving up
        #[arg(long, value_name = "SECS", default_value_t = 5)]
        timeout: u64,
    },

    /// Write a rule file without installing it
    GenConfig {
        #[command(flatten)]
        rules: RuleArgs,
    },

    /// Write a rule file and install it into an instance's namespace
    SetRules {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        rules: RuleArgs,

        /// Replace an existing rule set with the same name
        #[arg(long)]
        force: bool,
    },

    /// Install an existing rule file into an instance's namespace
    Install {
        /// Rule file to install
        file: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        /// Replace an existing rule set with the same name
        #[arg(long)]
        force: bool,
    },
}

/// Which instance a command addresses.
#[derive(Args, Debug, Clone, Default)]
pub struct InstanceArgs {
    /// Sequence id of the instance (`WHISTLE_SEQ_ID` takes precedence)
    #[arg(long)]
    pub seq_id: Option<String>,

    /// Use the proxy's default storage instead of an isolated namespace
    #[arg(long)]
    pub shared: bool,
}

impl InstanceArgs {
    pub fn options(&self) -> ControllerOptions {
        let mut options = ControllerOptions::new().with_shared_namespace(self.shared);
        if let Some(seq_id) = &self.seq_id {
            options = options.with_seq_id(seq_id.clone());
        }
        options
    }
}

/// The already-running instance a rule install goes to.
///
/// Unlike [`InstanceArgs`] there is no generated fallback: a fresh seq id
/// would name a namespace no instance uses.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Sequence id the instance was started with
    #[arg(long, env = "WHISTLE_SEQ_ID", required_unless_present = "shared")]
    pub seq_id: Option<String>,

    /// Target the instance using the proxy's default storage
    #[arg(long)]
    pub shared: bool,
}

impl TargetArgs {
    pub fn options(&self) -> ControllerOptions {
        let mut options = ControllerOptions::new().with_shared_namespace(self.shared);
        if let Some(seq_id) = &self.seq_id {
            options = options.with_seq_id(seq_id.clone());
        }
        options
    }
}

/// A rule set and where to write it.
#[derive(Args, Debug, Clone)]
pub struct RuleArgs {
    /// Rule set name
    #[arg(long)]
    pub name: String,

    /// Rule line; repeat for several rules
    #[arg(long = "rule", value_name = "RULE", required = true)]
    pub rules: Vec<String>,

    /// Directory to write the rule file to
    #[arg(long)]
    pub save_dir: Option<PathBuf>,

    /// Rule file name (default `.whistle.js`)
    #[arg(long)]
    pub file_name: Option<String>,
}

impl RuleArgs {
    pub fn rule_set(&self) -> RuleSet {
        RuleSet::from_lines(self.name.clone(), &self.rules)
    }

    pub fn file_options(&self) -> RuleFileOptions {
        let mut options = RuleFileOptions::new();
        if let Some(dir) = &self.save_dir {
            options = options.with_save_dir(dir.clone());
        }
        if let Some(name) = &self.file_name {
            options = options.with_file_name(name.clone());
        }
        options
    }
}
