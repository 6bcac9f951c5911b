//! Core domain types for whistlectl.
//!
//! Pure data and resolution logic shared by the runtime and CLI crates:
//! instance identity, lifecycle state, configuration with injected
//! environment overrides, namespace derivation, the error taxonomy and rule
//! file generation. No process or network I/O lives here.
#![deny(unused_crate_dependencies)]

pub mod config;
pub mod error;
pub mod identity;
pub mod namespace;
pub mod rules;
pub mod state;

pub use config::{
    BIN_ENV, CONTROLLER_TAG, ControllerOptions, ControllerSettings, DEFAULT_BASE_PORT,
    DEFAULT_BINARY, DEFAULT_PORT_RANGE, DEFAULT_STATUS_PATH, EnvSnapshot, PORT_ENV, SEQ_ID_ENV,
};
pub use error::{ControllerError, Result};
pub use identity::{InstanceIdentity, generate_seq_id, resolve_seq_id};
pub use namespace::resolve_namespace;
pub use rules::{
    CAPTURE_RULE, DEFAULT_RULE_FILE_NAME, GeneratedConfig, RuleContentHook, RuleFileOptions,
    RuleSet, default_save_dir, generate_config_file, render_rule_file,
};
pub use state::LifecycleState;
