//! Process supervisor - owns every running app process
//!
//! Each spawned process gets a wait task that owns the `Child`. The registry
//! only keeps what is needed to signal it and to observe its exit. Removing a
//! handle from the registry marks the process as being terminated: its exit
//! is then no longer reported to the controller.

use parking_lot::Mutex;
use sitepm_core::{AppKey, Error, Result, SitePaths, Settings};
use sitepm_logs::{AppLog, LogCapture, RotationConfig};
use sitepm_runtime::{signal, ShellCommand};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Lines of stderr attached to a failed spawn
const SPAWN_STDERR_LINES: usize = 5;

/// How long the wait task keeps draining output after the process exited
const CAPTURE_DRAIN: Duration = Duration::from_secs(2);

/// A supervised process ended on its own
#[derive(Debug, Clone)]
pub struct ProcessExit {
    pub key: AppKey,
    pub pid: u32,
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

/// How a termination request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// No process was registered for the app
    NotRunning,
    /// Exited within the grace period
    Graceful,
    /// Exited after being killed
    Forced,
    /// Still alive after the kill; given up on
    Unresponsive,
}

#[derive(Debug, Clone, Copy)]
struct ExitInfo {
    code: Option<i32>,
    signal: Option<i32>,
}

impl ExitInfo {
    fn from_status(status: std::io::Result<std::process::ExitStatus>) -> Self {
        match status {
            Ok(status) => Self {
                code: status.code(),
                signal: exit_signal(&status),
            },
            Err(e) => {
                warn!("Failed to wait for process: {}", e);
                Self {
                    code: None,
                    signal: None,
                }
            }
        }
    }

    fn describe(&self) -> String {
        match (self.code, self.signal) {
            (Some(code), _) => format!("process exited with code {}", code),
            (None, Some(signal)) => format!("process killed by signal {}", signal),
            (None, None) => "process exited".to_string(),
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

struct ProcessHandle {
    pid: u32,
    exited: watch::Receiver<Option<ExitInfo>>,
    kill: oneshot::Sender<()>,
}

type Registry = Arc<Mutex<HashMap<AppKey, ProcessHandle>>>;

/// Timing and log settings of the supervisor
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub home: PathBuf,
    pub graceful_stop: Duration,
    pub force_stop: Duration,
    pub startup_window: Duration,
    pub rotation: RotationConfig,
    pub buffer_lines: usize,
}

impl SupervisorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            home: settings.home.clone(),
            graceful_stop: settings.graceful_stop(),
            force_stop: settings.force_stop(),
            startup_window: settings.startup_window(),
            rotation: RotationConfig::from_settings(settings),
            buffer_lines: settings.log_buffer_lines,
        }
    }
}

/// Spawns, watches and terminates app processes
pub struct Supervisor {
    config: SupervisorConfig,
    handles: Registry,
    logs: Mutex<HashMap<AppKey, Arc<AppLog>>>,
    exit_tx: mpsc::UnboundedSender<ProcessExit>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> (Self, mpsc::UnboundedReceiver<ProcessExit>) {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            config,
            handles: Arc::new(Mutex::new(HashMap::new())),
            logs: Mutex::new(HashMap::new()),
            exit_tx,
        };
        (supervisor, exit_rx)
    }

    pub fn log_path(&self, site_id: &str, app_id: &str) -> PathBuf {
        SitePaths::new(&self.config.home, site_id).log_file(app_id)
    }

    /// The app's log sink, opened on first use
    pub fn log_for(&self, key: &AppKey) -> Result<Arc<AppLog>> {
        let mut logs = self.logs.lock();
        if let Some(log) = logs.get(key) {
            return Ok(Arc::clone(log));
        }
        let log = Arc::new(AppLog::open(
            self.log_path(&key.site_id, &key.app_id),
            self.config.rotation.clone(),
            self.config.buffer_lines,
        )?);
        logs.insert(key.clone(), Arc::clone(&log));
        Ok(log)
    }

    /// Launch `command` for `key`. Resolves once the process survived the
    /// startup window; an earlier exit is a spawn failure.
    pub async fn spawn(
        &self,
        key: &AppKey,
        command: &str,
        dir: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<u32> {
        if let Some(pid) = self.pid(key) {
            return Err(Error::spawn(format!(
                "{} already has a running process (pid {})",
                key, pid
            )));
        }

        let log = self.log_for(key)?;
        let mut child = ShellCommand::new(command, dir).envs(env).spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| Error::spawn("Process started but no PID available"))?;

        let captures =
            LogCapture::spawn_capture(Arc::clone(&log), child.stdout.take(), child.stderr.take());
        log.system(&format!("started '{}' (pid {})", command, pid));
        info!("Started {} with PID {}", key, pid);

        let (exit_tx, mut exited) = watch::channel(None);
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();

        // Registered before the wait task exists so it always finds its handle
        self.handles.lock().insert(
            key.clone(),
            ProcessHandle {
                pid,
                exited: exited.clone(),
                kill: kill_tx,
            },
        );

        let handles = Arc::clone(&self.handles);
        let events = self.exit_tx.clone();
        let task_key = key.clone();
        let task_log = Arc::clone(&log);
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                Ok(()) = &mut kill_rx => {
                    if let Err(e) = child.start_kill() {
                        debug!("Direct kill of {} failed: {}", pid, e);
                    }
                    child.wait().await
                }
            };
            let info = ExitInfo::from_status(status);

            for capture in captures {
                let _ = tokio::time::timeout(CAPTURE_DRAIN, capture).await;
            }
            task_log.system(&info.describe());

            let still_registered = {
                let mut handles = handles.lock();
                match handles.get(&task_key) {
                    Some(handle) if handle.pid == pid => {
                        handles.remove(&task_key);
                        true
                    }
                    _ => false,
                }
            };
            let _ = exit_tx.send(Some(info));

            if still_registered {
                info!("{} (pid {}) {}", task_key, pid, info.describe());
                let _ = events.send(ProcessExit {
                    key: task_key,
                    pid,
                    code: info.code,
                    signal: info.signal,
                });
            }
        });

        if wait_exit(&mut exited, self.config.startup_window).await {
            self.handles.lock().remove(key);
            let stderr: Vec<String> = log
                .recent_stderr(SPAWN_STDERR_LINES)
                .iter()
                .map(|l| crate::provision::strip_prefix(l).to_string())
                .collect();
            let detail = if stderr.is_empty() {
                "process exited during startup".to_string()
            } else {
                stderr.join("\n")
            };
            warn!("{} exited during startup: {}", key, detail);
            return Err(Error::spawn(detail));
        }

        Ok(pid)
    }

    /// Stop the process of `key`: SIGTERM to its group, then SIGKILL after
    /// the grace period. Always resolves; the handle is gone afterwards.
    pub async fn terminate(&self, key: &AppKey) -> Termination {
        let handle = self.handles.lock().remove(key);
        let Some(handle) = handle else {
            return Termination::NotRunning;
        };
        let ProcessHandle {
            pid,
            mut exited,
            kill,
        } = handle;

        let log = self.logs.lock().get(key).cloned();
        let note = |line: &str| {
            if let Some(log) = &log {
                log.system(line);
            }
        };

        note(&format!("stopping pid {}", pid));
        if !signal::terminate_group(pid) {
            debug!("No process group for {} (pid {})", key, pid);
        }

        if wait_exit(&mut exited, self.config.graceful_stop).await {
            info!("{} stopped gracefully", key);
            return Termination::Graceful;
        }

        warn!(
            "{} did not exit within {:?}, killing",
            key, self.config.graceful_stop
        );
        note(&format!(
            "no exit after {}s, sending SIGKILL",
            self.config.graceful_stop.as_secs()
        ));
        signal::kill_group(pid);
        let _ = kill.send(());

        if wait_exit(&mut exited, self.config.force_stop).await {
            return Termination::Forced;
        }

        error!(
            "{} (pid {}) survived SIGKILL, considering it stopped",
            key, pid
        );
        note(&format!("pid {} did not exit after SIGKILL", pid));
        Termination::Unresponsive
    }

    pub fn pid(&self, key: &AppKey) -> Option<u32> {
        self.handles.lock().get(key).map(|h| h.pid)
    }

    pub fn is_running(&self, key: &AppKey) -> bool {
        self.handles.lock().contains_key(key)
    }

    pub fn running(&self) -> Vec<AppKey> {
        let mut keys: Vec<AppKey> = self.handles.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Buffered lines of an app, `None` if nothing was logged this session
    pub fn recent_logs(&self, key: &AppKey, limit: usize) -> Option<Vec<String>> {
        self.logs.lock().get(key).map(|log| log.recent(limit))
    }

    pub fn forget_logs(&self, key: &AppKey) {
        self.logs.lock().remove(key);
    }
}

async fn wait_exit(exited: &mut watch::Receiver<Option<ExitInfo>>, limit: Duration) -> bool {
    // A dropped sender means the wait task finished too
    tokio::time::timeout(limit, exited.wait_for(|e| e.is_some()))
        .await
        .is_ok()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn supervisor(dir: &TempDir) -> (Supervisor, mpsc::UnboundedReceiver<ProcessExit>) {
        Supervisor::new(SupervisorConfig {
            home: dir.path().to_path_buf(),
            graceful_stop: Duration::from_secs(1),
            force_stop: Duration::from_secs(2),
            startup_window: Duration::from_millis(200),
            rotation: RotationConfig::default(),
            buffer_lines: 100,
        })
    }

    fn env() -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if let Ok(path) = std::env::var("PATH") {
            env.insert("PATH".to_string(), path);
        }
        env
    }

    #[tokio::test]
    async fn test_spawn_and_terminate_gracefully() {
        let dir = TempDir::new().unwrap();
        let (supervisor, mut exits) = supervisor(&dir);
        let key = AppKey::new("site-1", "app-1");

        let pid = supervisor
            .spawn(&key, "echo ready; sleep 30", dir.path(), &env())
            .await
            .unwrap();
        assert_eq!(supervisor.pid(&key), Some(pid));

        assert_eq!(supervisor.terminate(&key).await, Termination::Graceful);
        assert!(!supervisor.is_running(&key));
        assert!(!signal::is_alive(pid));
        assert_eq!(supervisor.terminate(&key).await, Termination::NotRunning);

        // Terminated processes are not reported as exits
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(exits.try_recv().is_err());

        let lines = supervisor.recent_logs(&key, 10).unwrap();
        assert!(lines.iter().any(|l| l.ends_with("[stdout] ready")));
    }

    #[tokio::test]
    async fn test_early_exit_is_spawn_failure() {
        let dir = TempDir::new().unwrap();
        let (supervisor, _exits) = supervisor(&dir);
        let key = AppKey::new("site-1", "app-1");

        let err = supervisor
            .spawn(&key, "echo 'Error: Cannot find module' >&2; exit 1", dir.path(), &env())
            .await
            .unwrap_err();
        match err {
            Error::SpawnFailed(msg) => assert_eq!(msg, "Error: Cannot find module"),
            other => panic!("unexpected error: {}", other),
        }
        assert!(!supervisor.is_running(&key));
    }

    #[tokio::test]
    async fn test_exit_after_startup_is_reported() {
        let dir = TempDir::new().unwrap();
        let (supervisor, mut exits) = supervisor(&dir);
        let key = AppKey::new("site-1", "app-1");

        let pid = supervisor
            .spawn(&key, "sleep 0.5; exit 1", dir.path(), &env())
            .await
            .unwrap();

        let exit = tokio::time::timeout(Duration::from_secs(5), exits.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit.key, key);
        assert_eq!(exit.pid, pid);
        assert_eq!(exit.code, Some(1));
        assert!(!supervisor.is_running(&key));

        let lines = supervisor.recent_logs(&key, 10).unwrap();
        assert!(lines
            .iter()
            .any(|l| l.ends_with("[system] process exited with code 1")));
    }

    #[tokio::test]
    async fn test_ignoring_sigterm_is_forced() {
        let dir = TempDir::new().unwrap();
        let (supervisor, _exits) = supervisor(&dir);
        let key = AppKey::new("site-1", "app-1");

        let pid = supervisor
            .spawn(&key, "trap '' TERM; sleep 30", dir.path(), &env())
            .await
            .unwrap();

        let started = std::time::Instant::now();
        assert_eq!(supervisor.terminate(&key).await, Termination::Forced);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(!signal::is_alive(pid));
    }

    #[tokio::test]
    async fn test_log_path_layout() {
        let dir = TempDir::new().unwrap();
        let (supervisor, _exits) = supervisor(&dir);
        assert_eq!(
            supervisor.log_path("site-1", "abc"),
            dir.path().join("sites").join("site-1").join("logs").join("abc.log")
        );
    }
}
