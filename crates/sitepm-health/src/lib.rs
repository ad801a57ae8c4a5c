//! sitepm Health Checks
//!
//! HTTP liveness probes against an app's port. A failed probe is soft: it is
//! counted, and crossing the configured retry threshold is reported once per
//! failure streak. Acting on it is up to the caller.

use chrono::{DateTime, Utc};
use sitepm_core::{HealthCheck, HealthStatus};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Health check result
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub message: Option<String>,
}

impl HealthCheckResult {
    pub fn healthy(duration_ms: u64) -> Self {
        Self {
            healthy: true,
            timestamp: Utc::now(),
            duration_ms,
            message: None,
        }
    }

    pub fn unhealthy(duration_ms: u64, message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            timestamp: Utc::now(),
            duration_ms,
            message: Some(message.into()),
        }
    }
}

/// Performs single HTTP probes
#[derive(Clone)]
pub struct HealthChecker {
    client: reqwest::Client,
}

impl HealthChecker {
    pub fn new() -> Self {
        // Probes target loopback; proxies from the environment must not apply
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .no_proxy()
            .build()
            .unwrap_or_default();

        Self { client }
    }

    /// Probe the app listening on `port`
    pub async fn check(&self, config: &HealthCheck, port: u16) -> HealthCheckResult {
        let url = config.url(port);
        self.check_http(&url, Duration::from_secs(config.timeout_secs))
            .await
    }

    /// Any 2xx response counts as healthy
    async fn check_http(&self, url: &str, timeout_duration: Duration) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = timeout(timeout_duration, self.client.get(url).send()).await;

        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_success() {
                    debug!("Health check passed: {} returned {}", url, status.as_u16());
                    HealthCheckResult::healthy(duration_ms)
                } else {
                    warn!("Health check failed: {} returned {}", url, status.as_u16());
                    HealthCheckResult::unhealthy(
                        duration_ms,
                        format!("Unexpected status: {}", status.as_u16()),
                    )
                }
            }
            Ok(Err(e)) => {
                warn!("Health check failed: {} - {}", url, e);
                HealthCheckResult::unhealthy(duration_ms, format!("Request failed: {}", e))
            }
            Err(_) => {
                warn!("Health check timed out: {}", url);
                HealthCheckResult::unhealthy(duration_ms, "Timeout")
            }
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic probing state of one running app
pub struct HealthMonitor {
    checker: HealthChecker,
    config: HealthCheck,
    port: u16,
    consecutive_failures: u32,
    total_failures: u64,
    threshold_signals: u64,
    last_check: Option<DateTime<Utc>>,
    last_message: Option<String>,
}

impl HealthMonitor {
    pub fn with_checker(checker: HealthChecker, config: HealthCheck, port: u16) -> Self {
        Self {
            checker,
            config,
            port,
            consecutive_failures: 0,
            total_failures: 0,
            threshold_signals: 0,
            last_check: None,
            last_message: None,
        }
    }

    /// Probe once and update the counters.
    /// Returns the result and whether this probe crossed the retry threshold.
    pub async fn check(&mut self) -> (HealthCheckResult, bool) {
        let result = self.checker.check(&self.config, self.port).await;
        let crossed = self.record(&result);
        (result, crossed)
    }

    /// Fold a probe result into the counters; true exactly once per streak
    pub fn record(&mut self, result: &HealthCheckResult) -> bool {
        self.last_check = Some(result.timestamp);
        self.last_message = result.message.clone();

        if result.healthy {
            self.consecutive_failures = 0;
            return false;
        }

        self.consecutive_failures += 1;
        self.total_failures += 1;

        let crossed = self.consecutive_failures == self.config.retries;
        if crossed {
            self.threshold_signals += 1;
        }
        crossed
    }

    /// Get the check interval
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.config.interval_secs)
    }

    pub fn url(&self) -> String {
        self.config.url(self.port)
    }

    pub fn status(&self) -> HealthStatus {
        HealthStatus {
            monitored: true,
            healthy: self.last_check.is_some() && self.consecutive_failures == 0,
            consecutive_failures: self.consecutive_failures,
            total_failures: self.total_failures,
            threshold_signals: self.threshold_signals,
            last_check: self.last_check,
            last_message: self.last_message.clone(),
        }
    }
}
