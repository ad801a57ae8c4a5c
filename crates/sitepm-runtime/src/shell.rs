//! Shell command lines run in their own process group

use sitepm_core::Result;
use sitepm_logs::{AppLog, LogCapture};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::signal;

/// How long to keep draining output after a command finished
const CAPTURE_DRAIN: Duration = Duration::from_secs(2);

/// Outcome of a bounded command
#[derive(Debug)]
pub enum RunOutcome {
    Exited(ExitStatus),
    TimedOut,
}

/// A command line for the platform shell with an explicit environment.
/// Nothing from the parent environment leaks in unless added.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    line: String,
    cwd: PathBuf,
    env: BTreeMap<String, String>,
}

impl ShellCommand {
    pub fn new(line: impl Into<String>, cwd: &Path) -> Self {
        Self {
            line: line.into(),
            cwd: cwd.to_path_buf(),
            env: BTreeMap::new(),
        }
    }

    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Pass the parent's PATH through
    pub fn inherit_path(mut self) -> Self {
        if let Ok(path) = std::env::var("PATH") {
            self.env.insert("PATH".to_string(), path);
        }
        self
    }

    fn build(&self) -> Command {
        #[cfg(unix)]
        let mut cmd = {
            let mut cmd = Command::new("/bin/sh");
            cmd.arg("-c").arg(&self.line);
            // Leader of a new group so signals reach the whole tree
            cmd.process_group(0);
            cmd
        };

        #[cfg(not(unix))]
        let mut cmd = {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(&self.line);
            cmd
        };

        cmd.current_dir(&self.cwd)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        cmd
    }

    /// Spawn with piped stdout and stderr
    pub fn spawn(&self) -> Result<Child> {
        debug!("Spawning '{}' in {}", self.line, self.cwd.display());
        let child = self.build().spawn().map_err(|e| {
            sitepm_core::Error::spawn(format!("Failed to run '{}': {}", self.line, e))
        })?;
        Ok(child)
    }

    /// Run to completion, streaming output into `log`.
    /// On timeout the whole process group is killed.
    pub async fn run(&self, log: &Arc<AppLog>, limit: Duration) -> Result<RunOutcome> {
        let mut child = self.spawn()?;
        let pid = child.id();
        let captures =
            LogCapture::spawn_capture(Arc::clone(log), child.stdout.take(), child.stderr.take());

        let outcome = match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => RunOutcome::Exited(status?),
            Err(_) => {
                warn!("'{}' exceeded {:?}, killing", self.line, limit);
                if let Some(pid) = pid {
                    signal::kill_group(pid);
                }
                if let Err(e) = child.kill().await {
                    debug!("Direct kill after timeout failed: {}", e);
                }
                RunOutcome::TimedOut
            }
        };

        // Escaped descendants may hold the pipes open; don't wait on them forever
        for capture in captures {
            let _ = tokio::time::timeout(CAPTURE_DRAIN, capture).await;
        }

        Ok(outcome)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use sitepm_logs::RotationConfig;
    use tempfile::TempDir;

    fn log(dir: &TempDir) -> Arc<AppLog> {
        Arc::new(AppLog::open(dir.path().join("app.log"), RotationConfig::default(), 100).unwrap())
    }

    #[tokio::test]
    async fn test_run_streams_output() {
        let dir = TempDir::new().unwrap();
        let log = log(&dir);

        let outcome = ShellCommand::new("echo installing; echo warn >&2", dir.path())
            .run(&log, Duration::from_secs(5))
            .await
            .unwrap();

        assert!(matches!(outcome, RunOutcome::Exited(s) if s.success()));
        let lines = log.recent(10);
        assert!(lines[0].ends_with("[stdout] installing"));
        assert!(lines[1].ends_with("[stderr] warn"));
    }

    #[tokio::test]
    async fn test_env_is_explicit() {
        let dir = TempDir::new().unwrap();
        let log = log(&dir);
        std::env::set_var("SITEPM_TEST_LEAK", "leaked");

        let mut env = BTreeMap::new();
        env.insert("GREETING".to_string(), "hi".to_string());
        ShellCommand::new("echo \"$GREETING:${SITEPM_TEST_LEAK:-none}\"", dir.path())
            .envs(&env)
            .run(&log, Duration::from_secs(5))
            .await
            .unwrap();

        assert!(log.recent(1)[0].ends_with("[stdout] hi:none"));
    }

    #[tokio::test]
    async fn test_failing_command() {
        let dir = TempDir::new().unwrap();
        let outcome = ShellCommand::new("exit 3", dir.path())
            .run(&log(&dir), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Exited(s) if s.code() == Some(3)));
    }

    #[tokio::test]
    async fn test_timeout_kills_group() {
        let dir = TempDir::new().unwrap();
        let started = std::time::Instant::now();

        let outcome = ShellCommand::new("sleep 30 & sleep 30; wait", dir.path())
            .inherit_path()
            .run(&log(&dir), Duration::from_millis(300))
            .await
            .unwrap();

        assert!(matches!(outcome, RunOutcome::TimedOut));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
