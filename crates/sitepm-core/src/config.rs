//! Daemon settings
//!
//! Supports multiple settings file formats:
//! - TOML (.toml)
//! - YAML (.yaml, .yml)
//! - JSON (.json)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

/// Supported settings file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(ConfigFormat::Toml),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }

    /// Detect format from file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Tunables for the orchestrator. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root for site records, logs and app sources
    pub home: PathBuf,
    pub max_apps_per_site: usize,
    pub port_range_start: u16,
    pub port_range_end: u16,
    /// Used when port probing is unavailable
    pub default_port: u16,
    pub clone_timeout_secs: u64,
    pub install_timeout_secs: u64,
    pub build_timeout_secs: u64,
    pub graceful_stop_secs: u64,
    pub force_stop_secs: u64,
    pub startup_window_ms: u64,
    pub log_buffer_lines: usize,
    pub log_max_size_bytes: u64,
    pub log_max_files: usize,
    /// Restart an app when its health check crosses the retry threshold
    pub restart_on_health_failure: bool,
    /// Parent environment variables passed through to apps
    pub inherit_env: Vec<String>,
    /// Node.js installs laid out as `{dir}/{version}/bin`. Unset: the
    /// inherited `PATH` decides which `node` runs.
    pub node_versions_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            home: sitepm_home(),
            max_apps_per_site: DEFAULT_MAX_APPS_PER_SITE,
            port_range_start: DEFAULT_PORT_RANGE_START,
            port_range_end: DEFAULT_PORT_RANGE_END,
            default_port: DEFAULT_PORT,
            clone_timeout_secs: DEFAULT_CLONE_TIMEOUT_SECS,
            install_timeout_secs: DEFAULT_INSTALL_TIMEOUT_SECS,
            build_timeout_secs: DEFAULT_BUILD_TIMEOUT_SECS,
            graceful_stop_secs: DEFAULT_GRACEFUL_STOP_SECS,
            force_stop_secs: DEFAULT_FORCE_STOP_SECS,
            startup_window_ms: DEFAULT_STARTUP_WINDOW_MS,
            log_buffer_lines: DEFAULT_LOG_BUFFER_LINES,
            log_max_size_bytes: DEFAULT_LOG_MAX_SIZE,
            log_max_files: DEFAULT_LOG_MAX_FILES,
            restart_on_health_failure: false,
            inherit_env: DEFAULT_INHERITED_ENV.iter().map(|s| s.to_string()).collect(),
            node_versions_dir: None,
        }
    }
}

impl Settings {
    /// Settings rooted at a specific home directory
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            ..Default::default()
        }
    }

    /// Load the default settings file, falling back to defaults when absent
    pub fn load_default() -> Result<Self> {
        let path = settings_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    /// Load settings from file, automatically detecting format from extension
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            Error::config(format!(
                "Unsupported settings file extension: {}. Expected .toml, .yaml, .yml, or .json",
                path.display()
            ))
        })?;

        let content = std::fs::read_to_string(path)?;
        let settings = Self::parse(&content, format)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings content with specified format
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let settings = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port_range_start == 0 || self.port_range_start > self.port_range_end {
            return Err(Error::config(format!(
                "Invalid port range {}-{}",
                self.port_range_start, self.port_range_end
            )));
        }
        if self.max_apps_per_site == 0 {
            return Err(Error::config("max_apps_per_site must be at least 1"));
        }
        if self.log_buffer_lines == 0 {
            return Err(Error::config("log_buffer_lines must be at least 1"));
        }
        Ok(())
    }

    pub fn site_paths(&self, site_id: &str) -> SitePaths {
        SitePaths::new(&self.home, site_id)
    }

    pub fn graceful_stop(&self) -> Duration {
        Duration::from_secs(self.graceful_stop_secs)
    }

    pub fn force_stop(&self) -> Duration {
        Duration::from_secs(self.force_stop_secs)
    }

    pub fn startup_window(&self) -> Duration {
        Duration::from_millis(self.startup_window_ms)
    }
}
