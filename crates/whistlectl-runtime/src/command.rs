//! Command builder for the proxy binary.
//!
//! Commands are kept as a plain argument list so they can be logged, shown
//! in error messages and asserted on in tests before anything is spawned.

use std::fmt;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// A fully assembled command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    program: String,
    args: Vec<String>,
}

impl LaunchCommand {
    /// Start building a command for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// `<binary> start [-S <namespace>] -p <port>`
    pub fn start(binary: &str, namespace: Option<&str>, port: u16) -> Self {
        let mut cmd = Self::new(binary).arg("start");
        if let Some(ns) = namespace {
            cmd = cmd.arg("-S").arg(ns);
        }
        cmd.arg("-p").arg(port.to_string())
    }

    /// `<binary> add <file> [-S <namespace>] [--force]`
    pub fn install(binary: &str, file: &Path, namespace: Option<&str>, force: bool) -> Self {
        let mut cmd = Self::new(binary)
            .arg("add")
            .arg(file.to_string_lossy().into_owned());
        if let Some(ns) = namespace {
            cmd = cmd.arg("-S").arg(ns);
        }
        if force {
            cmd = cmd.arg("--force");
        }
        cmd
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args_list(&self) -> &[String] {
        &self.args
    }

    /// Build a tokio command with null stdin and piped stdout/stderr.
    ///
    /// On Unix the child gets its own process group so it outlives signals
    /// aimed at the caller's group.
    pub(crate) fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.chars().any(char::is_whitespace) {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}
