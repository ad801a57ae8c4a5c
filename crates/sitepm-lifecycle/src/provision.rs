//! Clone, install and build phases preparing an app's source

use sitepm_core::{App, AppStatus, Error, Result, Settings};
use sitepm_logs::AppLog;
use sitepm_runtime::{RunOutcome, ShellCommand, SourceControl};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// One provisioning step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Cloning,
    Installing,
    Building,
}

impl Phase {
    pub fn status(&self) -> AppStatus {
        match self {
            Phase::Cloning => AppStatus::Cloning,
            Phase::Installing => AppStatus::Installing,
            Phase::Building => AppStatus::Building,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.status().as_str()
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs provisioning phases with per-phase time limits
pub struct Pipeline {
    source: Arc<dyn SourceControl>,
    clone_timeout: Duration,
    install_timeout: Duration,
    build_timeout: Duration,
}

impl Pipeline {
    pub fn new(source: Arc<dyn SourceControl>, settings: &Settings) -> Self {
        Self {
            source,
            clone_timeout: Duration::from_secs(settings.clone_timeout_secs),
            install_timeout: Duration::from_secs(settings.install_timeout_secs),
            build_timeout: Duration::from_secs(settings.build_timeout_secs),
        }
    }

    /// Phases still needed before `app` can start from `dir`.
    ///
    /// Cloning when the source is missing, installing when `node_modules` is
    /// missing, building whenever anything else runs and a build command is
    /// configured. `reprovision` forces all of them.
    pub fn plan(&self, app: &App, dir: &Path, reprovision: bool) -> Vec<Phase> {
        let mut phases = Vec::new();

        if reprovision || !has_source(dir) {
            phases.push(Phase::Cloning);
        }
        if reprovision || !phases.is_empty() || !dir.join("node_modules").exists() {
            phases.push(Phase::Installing);
        }
        if app.build_command.is_some() && !phases.is_empty() {
            phases.push(Phase::Building);
        }

        phases
    }

    /// Run a single phase. Output lands in `log`.
    pub async fn run_phase(
        &self,
        phase: Phase,
        app: &App,
        dir: &Path,
        env: &BTreeMap<String, String>,
        log: &Arc<AppLog>,
        reprovision: bool,
    ) -> Result<()> {
        match phase {
            Phase::Cloning => self.clone_source(app, dir, log, reprovision).await,
            Phase::Installing => {
                self.run_command(phase, &app.install_command, dir, env, log, self.install_timeout)
                    .await
            }
            Phase::Building => match &app.build_command {
                Some(cmd) => {
                    self.run_command(phase, cmd, dir, env, log, self.build_timeout)
                        .await
                }
                None => Ok(()),
            },
        }
    }

    async fn clone_source(
        &self,
        app: &App,
        dir: &Path,
        log: &Arc<AppLog>,
        reprovision: bool,
    ) -> Result<()> {
        if has_source(dir) {
            if !reprovision {
                return Err(Error::provision(
                    Phase::Cloning.as_str(),
                    "app directory already exists and is not empty",
                ));
            }
            info!("Wiping {} for re-provisioning", dir.display());
            std::fs::remove_dir_all(dir)?;
        }
        if let Some(parent) = dir.parent() {
            std::fs::create_dir_all(parent)?;
        }

        log.system(&format!(
            "cloning {} ({}) with {}",
            app.git_url,
            app.branch,
            self.source.name()
        ));

        let result = tokio::time::timeout(
            self.clone_timeout,
            self.source.clone_repo(&app.git_url, &app.branch, dir, log),
        )
        .await;

        let outcome = match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::PhaseTimeout {
                phase: Phase::Cloning.to_string(),
                secs: self.clone_timeout.as_secs(),
            }),
        };

        if let Err(e) = &outcome {
            log.system(&format!("cloning failed: {}", e));
            // A partial checkout would make the next attempt skip cloning
            if dir.exists() {
                if let Err(rm) = std::fs::remove_dir_all(dir) {
                    warn!("Failed to clean up {}: {}", dir.display(), rm);
                }
            }
        }
        outcome
    }

    async fn run_command(
        &self,
        phase: Phase,
        command: &str,
        dir: &Path,
        env: &BTreeMap<String, String>,
        log: &Arc<AppLog>,
        limit: Duration,
    ) -> Result<()> {
        log.system(&format!("{}: {}", phase, command));
        let stderr_before = log.recent_stderr(1).pop();

        let outcome = ShellCommand::new(command, dir)
            .envs(env)
            .run(log, limit)
            .await?;

        match outcome {
            RunOutcome::Exited(status) if status.success() => {
                log.system(&format!("{} finished", phase));
                Ok(())
            }
            RunOutcome::Exited(status) => {
                let code = status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "a signal".to_string());
                let mut message = format!("'{}' exited with {}", command, code);
                let last = log.recent_stderr(1).pop();
                if let Some(last) = last.filter(|l| Some(l) != stderr_before.as_ref()) {
                    message.push_str(": ");
                    message.push_str(strip_prefix(&last));
                }
                log.system(&format!("{} failed", phase));
                Err(Error::provision(phase.as_str(), message))
            }
            RunOutcome::TimedOut => {
                log.system(&format!("{} timed out after {}s", phase, limit.as_secs()));
                Err(Error::PhaseTimeout {
                    phase: phase.to_string(),
                    secs: limit.as_secs(),
                })
            }
        }
    }
}

fn has_source(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Drop the `[timestamp] [stream] ` prefix of a log line
pub(crate) fn strip_prefix(line: &str) -> &str {
    line.splitn(3, "] ").nth(2).unwrap_or(line)
}
