//! Command-line front end for whistlectl.
//!
//! Parsing lives in [`parser`] and [`commands`]; each subcommand is executed
//! by a module under [`handlers`]. `main.rs` only wires logging, `.env`
//! loading and dispatch.
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use tempfile as _;

// Used by main.rs
use dotenvy as _;
use tokio as _;
use tracing_subscriber as _;

pub mod commands;
pub mod handlers;
pub mod parser;

pub use commands::{Commands, InstanceArgs, RuleArgs, TargetArgs};
pub use handlers::start::StartArgs;
pub use parser::Cli;
