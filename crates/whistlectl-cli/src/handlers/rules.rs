//! Rule file commands: generate, install, and both in one step.

use std::path::Path;

use anyhow::{Context, Result};
use whistlectl_core::{EnvSnapshot, GeneratedConfig, generate_config_file};
use whistlectl_runtime::InstallReport;

use crate::commands::{RuleArgs, TargetArgs};

/// Write the rule file and print where it went.
pub fn gen_config(rules: &RuleArgs) -> Result<GeneratedConfig> {
    let generated = generate_config_file(&rules.rule_set(), &rules.file_options())
        .context("Failed to generate rule file")?;
    println!("Wrote {}", generated.full_path.display());
    Ok(generated)
}

/// Install an existing rule file.
pub async fn install(binary: Option<&str>, file: &Path, target: &TargetArgs, force: bool) -> Result<()> {
    let env = EnvSnapshot::capture();
    let settings = super::settings(&env, binary);
    let controller = super::controller(target.options().with_force_override(force), settings, env)?;

    let report = controller
        .install_rules(file)
        .await
        .with_context(|| format!("Failed to install rule file {}", file.display()))?;
    print_report(&report);
    Ok(())
}

/// Generate a rule file and install it.
pub async fn set_rules(binary: Option<&str>, target: &TargetArgs, rules: &RuleArgs, force: bool) -> Result<()> {
    let env = EnvSnapshot::capture();
    let settings = super::settings(&env, binary);
    let controller = super::controller(target.options().with_force_override(force), settings, env)?;

    let report = controller
        .set_rules(&rules.rule_set(), &rules.file_options())
        .await
        .with_context(|| format!("Failed to set rules `{}`", rules.name))?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &InstallReport) {
    println!("Ran: {}", report.command);
    if !report.output.is_empty() {
        println!("{}", report.output);
    }
    if !report.verified {
        println!("Note: the proxy does not confirm installs; check its UI to be sure.");
    }
}
