//! Lifecycle controller for one proxy instance.
//!
//! The controller owns the instance's identity and port and sequences
//! port resolution, launch and health polling. The proxy daemonizes, so
//! stopping works by discovery (port or tag) and never through a handle.
//!
//! # Example
//!
//! ```ignore
//! let mut controller = ProxyController::new(
//!     ControllerOptions::new().with_port(9422).with_seq_id("test"),
//! )?;
//! controller.start().await?;
//! controller.set_rules(&RuleSet::new("demo", "now.qq.com 1.2.3.4"), &RuleFileOptions::new()).await?;
//! controller.stop(None).await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};
use whistlectl_core::{
    CONTROLLER_TAG, ControllerError, ControllerOptions, ControllerSettings, EnvSnapshot,
    InstanceIdentity, LifecycleState, Result, RuleFileOptions, RuleSet, generate_config_file,
    resolve_namespace,
};

use crate::command::LaunchCommand;
use crate::health::HealthChecker;
use crate::ports::PortAllocator;
use crate::process::{
    BoundAddressMarker, ProcessTerminator, SuccessPredicate, SystemTerminator, launch,
    run_to_completion,
};

/// Result of a rule install.
///
/// The proxy only reports install results as text, so success here means
/// "the command exited 0", not "the rules are active".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub command: String,
    pub exit_code: Option<i32>,
    pub output: String,
    /// Always `false`: there is no machine-readable confirmation channel.
    pub verified: bool,
}

/// Starts, verifies and stops one proxy instance.
pub struct ProxyController {
    identity: InstanceIdentity,
    force_override: bool,
    settings: ControllerSettings,
    env: EnvSnapshot,
    allocator: PortAllocator,
    health: HealthChecker,
    terminator: Arc<dyn ProcessTerminator>,
    success_predicate: Option<Arc<dyn SuccessPredicate>>,
    state: LifecycleState,
}

impl std::fmt::Debug for ProxyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyController")
            .field("identity", &self.identity)
            .field("state", &self.state)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ProxyController {
    /// Create a controller using the current process environment and the
    /// system process terminator.
    pub fn new(options: ControllerOptions) -> Result<Self> {
        let env = EnvSnapshot::capture();
        let settings = ControllerSettings::from_env(&env);
        Self::with_parts(options, settings, env, Arc::new(SystemTerminator))
    }

    /// Create a controller with explicit settings, environment and terminator.
    pub fn with_parts(
        options: ControllerOptions,
        settings: ControllerSettings,
        env: EnvSnapshot,
        terminator: Arc<dyn ProcessTerminator>,
    ) -> Result<Self> {
        let identity = InstanceIdentity::resolve(&options, &env);
        let health = HealthChecker::from_settings(&settings)?;
        let allocator = PortAllocator::from_settings(&settings, Arc::clone(&terminator));

        Ok(Self {
            identity,
            force_override: options.force_override,
            settings,
            env,
            allocator,
            health,
            terminator,
            success_predicate: None,
            state: LifecycleState::Idle,
        })
    }

    /// Replace the launch success predicate (default: the bound-address marker).
    #[must_use]
    pub fn with_success_predicate(mut self, predicate: Arc<dyn SuccessPredicate>) -> Self {
        self.success_predicate = Some(predicate);
        self
    }

    pub fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }

    pub fn seq_id(&self) -> &str {
        &self.identity.seq_id
    }

    /// Port of this instance, once known.
    pub const fn port(&self) -> Option<u16> {
        self.identity.port
    }

    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn health_checker(&self) -> &HealthChecker {
        &self.health
    }

    pub fn port_allocator(&self) -> &PortAllocator {
        &self.allocator
    }

    /// Storage namespace, or `None` when sharing the default one.
    pub fn namespace(&self) -> Option<String> {
        resolve_namespace(
            CONTROLLER_TAG,
            &self.identity.seq_id,
            self.identity.use_shared_namespace,
        )
    }

    /// `w2 start [-S <namespace>] -p <port>`
    pub fn start_command(&self, port: u16) -> LaunchCommand {
        LaunchCommand::start(&self.settings.binary, self.namespace().as_deref(), port)
    }

    /// `w2 add <file> [-S <namespace>] [--force]`
    pub fn install_command(&self, file: &Path) -> LaunchCommand {
        LaunchCommand::install(
            &self.settings.binary,
            file,
            self.namespace().as_deref(),
            self.force_override,
        )
    }

    /// Start the proxy and wait until its status endpoint answers.
    ///
    /// Allowed from `Idle` and `Ready`. Any failure leaves the controller in
    /// `Failed`; retrying means constructing a new controller.
    pub async fn start(&mut self) -> Result<()> {
        if !self.state.can_start() {
            return Err(ControllerError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }

        info!(seq_id = %self.identity.seq_id, "Ready to start proxy ...");
        self.state = LifecycleState::Starting;

        match self.run_start().await {
            Ok(port) => {
                self.state = LifecycleState::Ready;
                info!(port, seq_id = %self.identity.seq_id, "Start proxy success!");
                Ok(())
            }
            Err(e) => {
                self.state = LifecycleState::Failed;
                error!(seq_id = %self.identity.seq_id, error = %e, "Failed to start proxy");
                Err(e)
            }
        }
    }

    async fn run_start(&mut self) -> Result<u16> {
        let port = self
            .allocator
            .resolve_port(&self.env, self.identity.port)
            .await?;
        self.identity.port = Some(port);

        if self.settings.clear_port_before_start {
            self.allocator.force_clear_port(port).await?;
        }

        let command = self.start_command(port);
        info!(namespace = ?self.namespace(), "{}", command);

        let marker = BoundAddressMarker::new(port);
        let predicate: &dyn SuccessPredicate = match &self.success_predicate {
            Some(p) => p.as_ref(),
            None => &marker,
        };
        launch(&command, predicate, self.settings.launch_timeout).await?;

        self.state = LifecycleState::AwaitingHealth;
        self.health
            .wait_until_ready(port, self.settings.health_timeout)
            .await?;

        Ok(port)
    }

    /// Re-check that an instance answers, using `port` or this controller's port.
    ///
    /// Works for instances this controller did not start.
    pub async fn verify(&self, port: Option<u16>) -> Result<()> {
        let port = port.or(self.identity.port).ok_or(ControllerError::PortUnknown)?;
        self.health
            .wait_until_ready(port, self.settings.health_timeout)
            .await
    }

    /// Stop the instance on `port`, or on this controller's port.
    ///
    /// With no port known this is a no-op: an instance whose port is unknown
    /// counts as already stopped.
    pub async fn stop(&mut self, port: Option<u16>) -> Result<()> {
        info!("Ready to stop proxy ...");

        let Some(target) = port.or(self.identity.port) else {
            info!("Skip to stop because proxy port is unknown!");
            return Ok(());
        };

        self.terminator.kill_port(target).await?;

        if Some(target) == self.identity.port && self.state.can_transition_to(LifecycleState::Stopped) {
            self.state = LifecycleState::Stopped;
        }

        info!("Stop proxy(http://127.0.0.1:{}) success!", target);
        Ok(())
    }

    /// Stop every isolated instance started by this tool on the host.
    ///
    /// Matches on the controller tag, so it also stops instances owned by
    /// other controllers and other processes. Instances in the shared
    /// namespace carry no tag and are not affected.
    pub async fn stop_all(&mut self) -> Result<()> {
        info!("Ready to stop all proxy instances ...");

        let pids = self.terminator.kill_tagged(CONTROLLER_TAG).await?;

        if self.state == LifecycleState::Ready {
            self.state = LifecycleState::Stopped;
        }

        info!(count = pids.len(), "Stop all proxy instances success!");
        Ok(())
    }

    /// Install a rule file into this instance's namespace.
    ///
    /// Best effort: the proxy offers no structured result, so a zero exit
    /// status is reported as an unverified success. A conflicting rule set
    /// may not be replaced unless `force_override` was set.
    pub async fn install_rules(&self, file: &Path) -> Result<InstallReport> {
        let command = self.install_command(file);
        info!("{}", command);

        let output = run_to_completion(&command, self.settings.launch_timeout).await?;

        if !output.success {
            return Err(ControllerError::InstallAmbiguous {
                command: command.to_string(),
                code: output.code,
                output: output.output,
            });
        }

        if self.force_override {
            info!(file = %file.display(), "Rule install command succeeded (unverified)");
        } else {
            warn!(
                file = %file.display(),
                "Rule install command succeeded but is unverified; an existing rule set with the same name may not have been replaced without force_override"
            );
        }

        Ok(InstallReport {
            command: command.to_string(),
            exit_code: output.code,
            output: output.output,
            verified: false,
        })
    }

    /// Generate a rule file for `rule_set` and install it.
    ///
    /// Validation happens before anything is written or run.
    pub async fn set_rules(&self, rule_set: &RuleSet, options: &RuleFileOptions) -> Result<InstallReport> {
        info!(name = %rule_set.name, "Ready to set proxy rules ...");

        let generated = generate_config_file(rule_set, options)?;
        let report = self.install_rules(&generated.full_path).await?;

        info!(name = %rule_set.name, "Set proxy rules success!");
        Ok(report)
    }
}
