//! Health monitor tasks of running apps

use parking_lot::Mutex;
use sitepm_core::{AppKey, HealthCheck, HealthStatus};
use sitepm_health::{HealthChecker, HealthMonitor};
use sitepm_logs::AppLog;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// An app crossed its health check retry threshold
#[derive(Debug, Clone)]
pub struct HealthSignal {
    pub key: AppKey,
    pub consecutive_failures: u32,
    pub url: String,
}

struct MonitorTask {
    token: CancellationToken,
    status: Arc<Mutex<HealthStatus>>,
}

/// One cancellable probe loop per monitored app
pub struct HealthRegistry {
    checker: HealthChecker,
    tasks: Mutex<HashMap<AppKey, MonitorTask>>,
    signal_tx: mpsc::UnboundedSender<HealthSignal>,
}

impl HealthRegistry {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HealthSignal>) {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let registry = Self {
            checker: HealthChecker::new(),
            tasks: Mutex::new(HashMap::new()),
            signal_tx,
        };
        (registry, signal_rx)
    }

    /// Start probing `key`, replacing any previous loop. The first probe runs
    /// one interval after start.
    pub fn start(&self, key: AppKey, config: HealthCheck, port: u16, log: Arc<AppLog>) {
        let token = CancellationToken::new();
        let status = Arc::new(Mutex::new(HealthStatus {
            monitored: true,
            ..Default::default()
        }));

        if let Some(previous) = self.tasks.lock().insert(
            key.clone(),
            MonitorTask {
                token: token.clone(),
                status: Arc::clone(&status),
            },
        ) {
            previous.token.cancel();
        }

        let mut monitor = HealthMonitor::with_checker(self.checker.clone(), config, port);
        let signals = self.signal_tx.clone();
        debug!("Monitoring {} at {}", key, monitor.url());

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(monitor.interval()) => {}
                }

                let (result, crossed) = tokio::select! {
                    _ = token.cancelled() => break,
                    outcome = monitor.check() => outcome,
                };
                *status.lock() = monitor.status();

                if !result.healthy {
                    let message = result.message.as_deref().unwrap_or("unhealthy");
                    warn!("Health check of {} failed: {}", key, message);
                    log.system(&format!(
                        "health check failed ({} in a row): {}",
                        monitor.status().consecutive_failures,
                        message
                    ));
                }

                if crossed {
                    let _ = signals.send(HealthSignal {
                        key: key.clone(),
                        consecutive_failures: monitor.status().consecutive_failures,
                        url: monitor.url(),
                    });
                }
            }
            debug!("Health monitor of {} stopped", key);
        });
    }

    pub fn stop(&self, key: &AppKey) {
        if let Some(task) = self.tasks.lock().remove(key) {
            task.token.cancel();
        }
    }

    pub fn stop_all(&self) {
        for (_, task) in self.tasks.lock().drain() {
            task.token.cancel();
        }
    }

    /// Counters of `key`; `monitored` is false when no loop runs
    pub fn status(&self, key: &AppKey) -> HealthStatus {
        self.tasks
            .lock()
            .get(key)
            .map(|task| task.status.lock().clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitepm_logs::RotationConfig;
    use std::time::Duration;
    use tempfile::TempDir;

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn check(retries: u32) -> HealthCheck {
        HealthCheck {
            endpoint: "/health".to_string(),
            interval_secs: 1,
            timeout_secs: 1,
            retries,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_signal_after_retries() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(
            AppLog::open(dir.path().join("app.log"), RotationConfig::default(), 100).unwrap(),
        );
        let (registry, mut signals) = HealthRegistry::new();
        let key = AppKey::new("site-1", "app-1");

        registry.start(key.clone(), check(2), closed_port(), Arc::clone(&log));
        assert!(registry.status(&key).monitored);

        let signal = tokio::time::timeout(Duration::from_secs(10), signals.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signal.key, key);
        assert_eq!(signal.consecutive_failures, 2);

        let status = registry.status(&key);
        assert!(status.monitored);
        assert!(!status.healthy);
        assert_eq!(status.threshold_signals, 1);
        assert!(log
            .recent(10)
            .iter()
            .any(|l| l.contains("[system] health check failed (1 in a row)")));

        registry.stop(&key);
        assert!(!registry.status(&key).monitored);
    }

    #[tokio::test]
    async fn test_cancelled_loop_stays_quiet() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(
            AppLog::open(dir.path().join("app.log"), RotationConfig::default(), 100).unwrap(),
        );
        let (registry, mut signals) = HealthRegistry::new();
        let key = AppKey::new("site-1", "app-1");

        registry.start(key.clone(), check(1), closed_port(), log);
        registry.stop_all();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(signals.try_recv().is_err());
        assert!(!registry.status(&key).monitored);
    }
}
