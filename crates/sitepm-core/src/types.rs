//! Core types for sitepm

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::constants::*;
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_install_command() -> String {
    DEFAULT_INSTALL_COMMAND.to_string()
}

fn default_start_command() -> String {
    DEFAULT_START_COMMAND.to_string()
}

fn default_node_version() -> String {
    DEFAULT_NODE_VERSION.to_string()
}

fn default_true() -> bool {
    true
}

/// Site ids become directory names: alphanumeric, underscore, and hyphen only
static SITE_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Invalid site id regex"));

/// App names are human-readable but must not start with punctuation
static APP_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9 _.-]{0,63}$").expect("Invalid app name regex")
});

static ENV_KEY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid env key regex"));

/// `user@host:path` remotes
static SCP_URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.-]+@[\w.-]+:\S+$").expect("Invalid scp url regex"));

const GIT_URL_SCHEMES: &[&str] = &["https://", "http://", "ssh://", "git://", "file://"];

/// Validate a site id to prevent path traversal
pub fn validate_site_id(site_id: &str) -> bool {
    !site_id.is_empty() && SITE_ID_REGEX.is_match(site_id)
}

pub fn validate_app_name(name: &str) -> bool {
    APP_NAME_REGEX.is_match(name)
}

/// Name as it appears in exported variables: `my-api` -> `MY_API`
pub fn export_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

pub fn validate_env_key(key: &str) -> bool {
    ENV_KEY_REGEX.is_match(key)
}

pub fn validate_git_url(url: &str) -> bool {
    if url.chars().any(char::is_whitespace) {
        return false;
    }
    GIT_URL_SCHEMES
        .iter()
        .any(|scheme| url.len() > scheme.len() && url.starts_with(scheme))
        || SCP_URL_REGEX.is_match(url)
}

/// Identity of the site that owns a set of apps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SiteInfo {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub url: String,
    pub path: String,
}

impl SiteInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        let name = name.into();
        let domain = format!("{}.local", id);
        Self {
            url: format!("http://{}", domain),
            path: String::new(),
            id,
            name,
            domain,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

/// Key of a supervised app: apps are only unique within their site
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppKey {
    pub site_id: String,
    pub app_id: String,
}

impl AppKey {
    pub fn new(site_id: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            app_id: app_id.into(),
        }
    }
}

impl std::fmt::Display for AppKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.site_id, self.app_id)
    }
}

/// Health check configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Path on the app's port (e.g. "/health") or an absolute URL
    pub endpoint: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    /// Consecutive failures before a failure signal is raised
    pub retries: u32,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "/".to_string(),
            interval_secs: 30,
            timeout_secs: 5,
            retries: 3,
        }
    }
}

impl HealthCheck {
    pub fn http(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Resolve the probe URL against the app's port
    pub fn url(&self, port: u16) -> String {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            self.endpoint.clone()
        } else if self.endpoint.starts_with('/') {
            format!("http://127.0.0.1:{}{}", port, self.endpoint)
        } else {
            format!("http://127.0.0.1:{}/{}", port, self.endpoint)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::validation("health check endpoint is empty"));
        }
        if self.interval_secs == 0 || self.timeout_secs == 0 {
            return Err(Error::validation(
                "health check interval and timeout must be at least 1 second",
            ));
        }
        if self.retries == 0 {
            return Err(Error::validation("health check retries must be at least 1"));
        }
        Ok(())
    }
}

/// Application status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    Stopped,
    Cloning,
    Installing,
    Building,
    Starting,
    Running,
    Stopping,
    Error,
    Restarting,
}

impl AppStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppStatus::Stopped => "stopped",
            AppStatus::Cloning => "cloning",
            AppStatus::Installing => "installing",
            AppStatus::Building => "building",
            AppStatus::Starting => "starting",
            AppStatus::Running => "running",
            AppStatus::Stopping => "stopping",
            AppStatus::Error => "error",
            AppStatus::Restarting => "restarting",
        }
    }

    /// Stable states survive a host restart
    pub fn is_stable(&self) -> bool {
        matches!(self, AppStatus::Stopped | AppStatus::Running | AppStatus::Error)
    }

    /// A process may be alive in these states
    pub fn is_active(&self) -> bool {
        matches!(self, AppStatus::Running | AppStatus::Starting)
    }
}

impl std::fmt::Display for AppStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AppStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "stopped" => Ok(AppStatus::Stopped),
            "cloning" => Ok(AppStatus::Cloning),
            "installing" => Ok(AppStatus::Installing),
            "building" => Ok(AppStatus::Building),
            "starting" => Ok(AppStatus::Starting),
            "running" => Ok(AppStatus::Running),
            "stopping" => Ok(AppStatus::Stopping),
            "error" => Ok(AppStatus::Error),
            "restarting" => Ok(AppStatus::Restarting),
            _ => Err(Error::validation(format!("Invalid status: {}", s))),
        }
    }
}

/// A managed app and its operational state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub id: String,
    pub name: String,
    pub git_url: String,
    pub branch: String,
    pub install_command: String,
    #[serde(default)]
    pub build_command: Option<String>,
    pub start_command: String,
    pub node_version: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub inject_wp_env: bool,
    pub status: AppStatus,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Recent output; filled from the in-memory buffer when handed to callers
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default)]
    pub health_check: Option<HealthCheck>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl App {
    /// Force a persisted transient status into a stable one.
    /// No process handle survives a host restart.
    /// Returns true if anything changed.
    pub fn reconcile_after_restart(&mut self) -> bool {
        let before = (self.status, self.pid);
        match self.status {
            AppStatus::Running | AppStatus::Stopping => {
                self.status = AppStatus::Stopped;
            }
            AppStatus::Cloning
            | AppStatus::Installing
            | AppStatus::Building
            | AppStatus::Starting
            | AppStatus::Restarting => {
                self.status = AppStatus::Error;
                self.last_error = Some("Interrupted by host restart".to_string());
            }
            AppStatus::Stopped | AppStatus::Error => {}
        }
        self.pid = None;
        if self.status != AppStatus::Running {
            self.started_at = None;
        }
        let changed = before != (self.status, self.pid);
        if changed {
            self.touch();
        }
        changed
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Request to register a new app, validated before entering the state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApp {
    pub name: String,
    pub git_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_install_command")]
    pub install_command: String,
    #[serde(default)]
    pub build_command: Option<String>,
    #[serde(default = "default_start_command")]
    pub start_command: String,
    #[serde(default = "default_node_version")]
    pub node_version: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub inject_wp_env: bool,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default)]
    pub health_check: Option<HealthCheck>,
}

impl NewApp {
    pub fn new(name: impl Into<String>, git_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            git_url: git_url.into(),
            branch: default_branch(),
            install_command: default_install_command(),
            build_command: None,
            start_command: default_start_command(),
            node_version: default_node_version(),
            env: BTreeMap::new(),
            inject_wp_env: false,
            auto_start: false,
            health_check: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_install_command(mut self, cmd: impl Into<String>) -> Self {
        self.install_command = cmd.into();
        self
    }

    pub fn with_build_command(mut self, cmd: impl Into<String>) -> Self {
        self.build_command = Some(cmd.into());
        self
    }

    pub fn with_start_command(mut self, cmd: impl Into<String>) -> Self {
        self.start_command = cmd.into();
        self
    }

    pub fn with_node_version(mut self, version: impl Into<String>) -> Self {
        self.node_version = version.into();
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn with_health_check(mut self, health_check: HealthCheck) -> Self {
        self.health_check = Some(health_check);
        self
    }

    /// Shape checks that do not depend on the site's other apps
    pub fn validate(&self) -> Result<()> {
        if !validate_app_name(&self.name) {
            return Err(Error::validation(format!(
                "Invalid app name '{}': use 1-64 letters, digits, spaces, '.', '_' or '-'",
                self.name
            )));
        }
        if !validate_git_url(&self.git_url) {
            return Err(Error::validation(format!(
                "Invalid git URL '{}'",
                self.git_url
            )));
        }
        if self.branch.trim().is_empty() || self.branch.chars().any(char::is_whitespace) {
            return Err(Error::validation("branch must be a single non-empty ref"));
        }
        if self.install_command.trim().is_empty() {
            return Err(Error::validation("install command is empty"));
        }
        if self.start_command.trim().is_empty() {
            return Err(Error::validation("start command is empty"));
        }
        if matches!(&self.build_command, Some(cmd) if cmd.trim().is_empty()) {
            return Err(Error::validation("build command is empty"));
        }
        if self.node_version.trim().is_empty() {
            return Err(Error::validation("node version is empty"));
        }
        validate_env(&self.env)?;
        if let Some(hc) = &self.health_check {
            hc.validate()?;
        }
        Ok(())
    }

    /// Build the stored entry. The app starts life in `cloning`.
    pub fn into_app(self) -> App {
        let now = Utc::now();
        App {
            id: uuid::Uuid::new_v4().to_string(),
            name: self.name.trim().to_string(),
            git_url: self.git_url,
            branch: self.branch,
            install_command: self.install_command,
            build_command: self.build_command,
            start_command: self.start_command,
            node_version: self.node_version,
            port: None,
            env: self.env,
            inject_wp_env: self.inject_wp_env,
            status: AppStatus::Cloning,
            pid: None,
            started_at: None,
            last_error: None,
            logs: Vec::new(),
            auto_start: self.auto_start,
            health_check: self.health_check,
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn validate_env(env: &BTreeMap<String, String>) -> Result<()> {
    if let Some(key) = env.keys().find(|k| !validate_env_key(k)) {
        return Err(Error::validation(format!(
            "Invalid environment variable name '{}'",
            key
        )));
    }
    Ok(())
}

/// Ordered app collection of one site
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteApps {
    #[serde(default)]
    pub apps: Vec<App>,
}

impl SiteApps {
    pub fn get(&self, app_id: &str) -> Option<&App> {
        self.apps.iter().find(|a| a.id == app_id)
    }

    pub fn get_mut(&mut self, app_id: &str) -> Option<&mut App> {
        self.apps.iter_mut().find(|a| a.id == app_id)
    }

    /// An app whose name equals `name` or exports under the same variables
    pub fn name_conflict(&self, name: &str) -> Option<&App> {
        let exported = export_name(name);
        self.apps
            .iter()
            .find(|a| a.name == name.trim() || export_name(&a.name) == exported)
    }

    /// Replace an existing entry in place, or append
    pub fn upsert(&mut self, app: App) {
        match self.get_mut(&app.id) {
            Some(existing) => *existing = app,
            None => self.apps.push(app),
        }
    }

    pub fn remove(&mut self, app_id: &str) -> Option<App> {
        let pos = self.apps.iter().position(|a| a.id == app_id)?;
        Some(self.apps.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

/// Health counters of a monitored app
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub monitored: bool,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub threshold_signals: u64,
    pub last_check: Option<DateTime<Utc>>,
    pub last_message: Option<String>,
}

/// Per-app outcome of a site-wide operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<BulkFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkFailure {
    pub app_id: String,
    pub error: String,
}

impl BulkReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_app() -> NewApp {
        NewApp::new("api", "https://github.com/acme/api.git")
            .with_install_command("npm install")
            .with_start_command("npm start")
            .with_node_version("20.x")
    }

    #[test]
    fn test_new_app_defaults_from_json() {
        let app: NewApp = serde_json::from_str(
            r#"{"name":"api","gitUrl":"https://github.com/acme/api.git"}"#,
        )
        .unwrap();
        assert_eq!(app.branch, "main");
        assert_eq!(app.install_command, "npm install");
        assert_eq!(app.start_command, "npm start");
        assert!(app.build_command.is_none());
        assert!(!app.auto_start);
        assert!(app.validate().is_ok());
    }

    #[test]
    fn test_new_app_validation_rejects_bad_input() {
        assert!(NewApp::new("", "https://x.test/r.git").validate().is_err());
        assert!(NewApp::new("../evil", "https://x.test/r.git").validate().is_err());
        assert!(NewApp::new("api", "not a url").validate().is_err());
        assert!(scenario_app().with_start_command("  ").validate().is_err());
        assert!(scenario_app().with_build_command("").validate().is_err());

        let mut env = BTreeMap::new();
        env.insert("BAD-KEY".to_string(), "1".to_string());
        assert!(scenario_app().with_env(env).validate().is_err());

        let hc = HealthCheck {
            retries: 0,
            ..Default::default()
        };
        assert!(scenario_app().with_health_check(hc).validate().is_err());
    }

    #[test]
    fn test_git_url_forms() {
        assert!(validate_git_url("https://github.com/acme/api.git"));
        assert!(validate_git_url("git@github.com:acme/api.git"));
        assert!(validate_git_url("file:///srv/repos/api"));
        assert!(!validate_git_url("https://"));
        assert!(!validate_git_url("/srv/repos/api"));
        assert!(!validate_git_url("https://github.com/acme/a b.git"));
    }

    #[test]
    fn test_into_app_starts_cloning() {
        let app = scenario_app().into_app();
        assert_eq!(app.status, AppStatus::Cloning);
        assert!(app.port.is_none());
        assert!(app.pid.is_none());
        assert!(!app.id.is_empty());
    }

    #[test]
    fn test_reconcile_after_restart() {
        let mut app = scenario_app().into_app();
        app.status = AppStatus::Running;
        app.pid = Some(4242);
        assert!(app.reconcile_after_restart());
        assert_eq!(app.status, AppStatus::Stopped);
        assert!(app.pid.is_none());

        app.status = AppStatus::Installing;
        assert!(app.reconcile_after_restart());
        assert_eq!(app.status, AppStatus::Error);
        assert!(app.last_error.is_some());

        assert!(!app.reconcile_after_restart());
    }

    #[test]
    fn test_status_classes() {
        for status in [AppStatus::Stopped, AppStatus::Running, AppStatus::Error] {
            assert!(status.is_stable());
        }
        for status in [
            AppStatus::Cloning,
            AppStatus::Installing,
            AppStatus::Building,
            AppStatus::Starting,
            AppStatus::Stopping,
            AppStatus::Restarting,
        ] {
            assert!(!status.is_stable());
        }
        assert_eq!("Running".parse::<AppStatus>().unwrap(), AppStatus::Running);
        assert!("crashed".parse::<AppStatus>().is_err());
    }

    #[test]
    fn test_health_check_url() {
        assert_eq!(
            HealthCheck::http("/health").url(3001),
            "http://127.0.0.1:3001/health"
        );
        assert_eq!(HealthCheck::http("ping").url(3001), "http://127.0.0.1:3001/ping");
        assert_eq!(
            HealthCheck::http("http://api.local/up").url(3001),
            "http://api.local/up"
        );
    }

    #[test]
    fn test_site_apps_preserves_insertion_order() {
        let mut site = SiteApps::default();
        let a = NewApp::new("a", "https://x.test/a.git").into_app();
        let b = NewApp::new("b", "https://x.test/b.git").into_app();
        let a_id = a.id.clone();
        site.upsert(a);
        site.upsert(b);

        let mut renamed = site.get(&a_id).unwrap().clone();
        renamed.port = Some(3001);
        site.upsert(renamed);

        let names: Vec<_> = site.apps.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(site.get(&a_id).unwrap().port, Some(3001));
        assert!(site.name_conflict("b").is_some());
        assert!(site.name_conflict("c").is_none());
        assert!(site.remove(&a_id).is_some());
        assert_eq!(site.len(), 1);
    }

    #[test]
    fn test_export_name_collisions() {
        assert_eq!(export_name("my-api"), "MY_API");
        assert_eq!(export_name(" web app.v2 "), "WEB_APP_V2");

        let mut site = SiteApps::default();
        site.upsert(NewApp::new("my-api", "https://x.test/a.git").into_app());
        assert_eq!(site.name_conflict("my_api").unwrap().name, "my-api");
        assert_eq!(site.name_conflict("My.Api").unwrap().name, "my-api");
        assert!(site.name_conflict("my-api-2").is_none());
    }

    #[test]
    fn test_validate_site_id() {
        assert!(validate_site_id("site-1"));
        assert!(!validate_site_id("../etc"));
        assert!(!validate_site_id(""));
    }
}
