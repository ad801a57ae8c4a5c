//! `git` command line as the default source control client

use async_trait::async_trait;
use sitepm_core::{Error, Result};
use sitepm_logs::{AppLog, LogStream};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

use crate::traits::SourceControl;

/// Shallow single-branch clones through the `git` binary on PATH
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCli;

impl GitCli {
    fn clone_args<'a>(url: &'a str, branch: &'a str, dest: &'a Path) -> Vec<&'a std::ffi::OsStr> {
        vec![
            "clone".as_ref(),
            "--depth".as_ref(),
            "1".as_ref(),
            "--single-branch".as_ref(),
            "--branch".as_ref(),
            branch.as_ref(),
            "--".as_ref(),
            url.as_ref(),
            dest.as_os_str(),
        ]
    }
}

#[async_trait]
impl SourceControl for GitCli {
    async fn clone_repo(&self, url: &str, branch: &str, dest: &Path, log: &AppLog) -> Result<()> {
        let git = which::which("git")
            .map_err(|_| Error::provision("cloning", "git is not installed or not on PATH"))?;

        info!("Cloning {} ({}) into {}", url, branch, dest.display());

        let mut cmd = Command::new(git);
        cmd.args(Self::clone_args(url, branch, dest))
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A dropped future (timeout) must not leave git running
            .kill_on_drop(true);

        let output = cmd
            .output()
            .await
            .map_err(|e| Error::provision("cloning", format!("Failed to run git: {}", e)))?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            log.append(LogStream::Stdout, line);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            log.append(LogStream::Stderr, line);
        }

        if !output.status.success() {
            let reason = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("git clone failed");
            return Err(Error::provision("cloning", reason.trim()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "git"
    }
}
