//! Rule configuration file generation.
//!
//! The proxy installs rules from a JS module of the form
//! `module.exports = { "name": ..., "rules": ... };`. Rule syntax itself is
//! opaque here; only the required fields are checked.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::error::{ControllerError, Result};

/// Default rule file name.
pub const DEFAULT_RULE_FILE_NAME: &str = ".whistle.js";

/// Rule prepended to every generated rule set.
///
/// Without tunnel capture HTTPS traffic is not intercepted.
pub const CAPTURE_RULE: &str = "* enable://capture";

/// A named group of proxy rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Rule group name shown in the proxy UI.
    pub name: String,
    /// Newline-separated rule lines.
    pub rules: String,
}

impl RuleSet {
    /// Create a rule set.
    pub fn new(name: impl Into<String>, rules: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: rules.into(),
        }
    }

    /// Create a rule set from individual rule lines.
    pub fn from_lines<I, S>(name: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = lines
            .into_iter()
            .map(|l| l.as_ref().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        Self::new(name, rules)
    }

    /// Reject rule sets with an empty name or empty rules.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ControllerError::ConfigValidation(
                "rule set name is empty".to_string(),
            ));
        }
        if self.rules.trim().is_empty() {
            return Err(ControllerError::ConfigValidation(format!(
                "rule set `{}` has no rules",
                self.name
            )));
        }
        Ok(())
    }
}

/// Hook to rewrite rule content before it is written: `(content, save_dir) -> content`.
pub type RuleContentHook = Box<dyn Fn(&str, &Path) -> String + Send + Sync>;

/// Where and how to write the rule file.
#[derive(Default)]
pub struct RuleFileOptions {
    /// Directory for the file; defaults to [`default_save_dir`].
    pub save_dir: Option<PathBuf>,
    /// File name; defaults to [`DEFAULT_RULE_FILE_NAME`].
    pub file_name: Option<String>,
    /// Optional content rewrite applied after the capture rule is prepended.
    pub handle_rule_content: Option<RuleContentHook>,
}

impl fmt::Debug for RuleFileOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleFileOptions")
            .field("save_dir", &self.save_dir)
            .field("file_name", &self.file_name)
            .field("handle_rule_content", &self.handle_rule_content.is_some())
            .finish()
    }
}

impl RuleFileOptions {
    /// Write to the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target directory.
    #[must_use]
    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = Some(dir.into());
        self
    }

    /// Set the file name.
    #[must_use]
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Install a content rewrite hook.
    #[must_use]
    pub fn with_content_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &Path) -> String + Send + Sync + 'static,
    {
        self.handle_rule_content = Some(Box::new(hook));
        self
    }
}

/// A rule file written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedConfig {
    pub full_path: PathBuf,
    pub content: String,
    pub save_dir: PathBuf,
    pub file_name: String,
}

/// Default directory for generated rule files.
pub fn default_save_dir() -> PathBuf {
    std::env::temp_dir().join("whistlectl")
}

/// Render the file content for a rule set without touching the filesystem.
pub fn render_rule_file(
    rule_set: &RuleSet,
    save_dir: &Path,
    hook: Option<&RuleContentHook>,
) -> Result<String> {
    rule_set.validate()?;

    let mut content = format!("{CAPTURE_RULE}\n\n{}", rule_set.rules);
    if let Some(hook) = hook {
        content = hook(&content, save_dir);
    }

    let rendered = RuleSet::new(rule_set.name.clone(), content);
    let json = serde_json::to_string_pretty(&rendered)?;
    Ok(format!("module.exports = {json};"))
}

/// Validate, render and write a rule file, replacing any previous one.
///
/// Validation happens first; nothing is written for an invalid rule set.
pub fn generate_config_file(rule_set: &RuleSet, options: &RuleFileOptions) -> Result<GeneratedConfig> {
    if let Err(e) = rule_set.validate() {
        error!(name = %rule_set.name, "Refusing to generate proxy rules: {}", e);
        return Err(e);
    }

    let save_dir = options.save_dir.clone().unwrap_or_else(default_save_dir);
    let file_name = options
        .file_name
        .clone()
        .unwrap_or_else(|| DEFAULT_RULE_FILE_NAME.to_string());

    let content = render_rule_file(rule_set, &save_dir, options.handle_rule_content.as_ref())?;
    let full_path = save_dir.join(&file_name);

    match fs::remove_file(&full_path) {
        Ok(()) => debug!(path = %full_path.display(), "Removed previous rule file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    fs::create_dir_all(&save_dir)?;
    fs::write(&full_path, &content)?;
    debug!(path = %full_path.display(), "Wrote rule file");

    Ok(GeneratedConfig {
        full_path,
        content,
        save_dir,
        file_name,
    })
}
