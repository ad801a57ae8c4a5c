//! Constants and default paths for sitepm

use std::path::{Path, PathBuf};

/// Default sitepm home directory name
pub const SITEPM_DIR: &str = ".sitepm";

/// Environment variable overriding the home directory
pub const HOME_ENV: &str = "SITEPM_HOME";

/// Default socket file name
pub const SOCKET_FILE: &str = "daemon.sock";

/// Default settings file name
pub const SETTINGS_FILE: &str = "config.toml";

/// Directory holding one subdirectory per site
pub const SITES_DIR: &str = "sites";

/// Per-site app collection file
pub const APPS_FILE: &str = "apps.json";

/// Per-site log directory name
pub const LOGS_DIR: &str = "logs";

/// Per-site app source directory name
pub const APPS_DIR: &str = "apps";

pub const DEFAULT_MAX_APPS_PER_SITE: usize = 10;
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_PORT_RANGE_START: u16 = 3001;
pub const DEFAULT_PORT_RANGE_END: u16 = 3999;

pub const DEFAULT_CLONE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_INSTALL_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 600;

/// Grace period after SIGTERM before escalating
pub const DEFAULT_GRACEFUL_STOP_SECS: u64 = 5;

/// Wait after SIGKILL before declaring the process stopped anyway
pub const DEFAULT_FORCE_STOP_SECS: u64 = 3;

/// A process exiting inside this window counts as a failed spawn
pub const DEFAULT_STARTUP_WINDOW_MS: u64 = 500;

pub const DEFAULT_LOG_BUFFER_LINES: usize = 1000;

/// Default log max size in bytes (10MB)
pub const DEFAULT_LOG_MAX_SIZE: u64 = 10 * 1024 * 1024;

/// Default max rotated log files to keep
pub const DEFAULT_LOG_MAX_FILES: usize = 5;

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_INSTALL_COMMAND: &str = "npm install";
pub const DEFAULT_START_COMMAND: &str = "npm start";
pub const DEFAULT_NODE_VERSION: &str = "20.x";

/// Runtime mode exported to every app
pub const NODE_ENV_VALUE: &str = "development";

/// Parent variables an app may inherit by default
pub const DEFAULT_INHERITED_ENV: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LOGNAME",
    "SHELL",
    "LANG",
    "LC_ALL",
    "TERM",
    "TMPDIR",
    "TMP",
    "TEMP",
    "SystemRoot",
    "APPDATA",
    "LOCALAPPDATA",
    "USERPROFILE",
    "COMSPEC",
];

/// Get the sitepm home directory
pub fn sitepm_home() -> PathBuf {
    if let Some(dir) = std::env::var_os(HOME_ENV) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|h| h.join(SITEPM_DIR))
        .unwrap_or_else(|| PathBuf::from(SITEPM_DIR))
}

/// Get the socket path
pub fn socket_path() -> PathBuf {
    sitepm_home().join(SOCKET_FILE)
}

/// Get the settings file path
pub fn settings_path() -> PathBuf {
    sitepm_home().join(SETTINGS_FILE)
}

/// Site-scoped locations below a home directory
#[derive(Debug, Clone)]
pub struct SitePaths {
    root: PathBuf,
}

impl SitePaths {
    pub fn new(home: &Path, site_id: &str) -> Self {
        Self {
            root: home.join(SITES_DIR).join(site_id),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The durable app collection record
    pub fn apps_file(&self) -> PathBuf {
        self.root.join(APPS_FILE)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    pub fn log_file(&self, app_id: &str) -> PathBuf {
        self.logs_dir().join(format!("{}.log", app_id))
    }

    pub fn apps_dir(&self) -> PathBuf {
        self.root.join(APPS_DIR)
    }

    pub fn app_dir(&self, app_id: &str) -> PathBuf {
        self.apps_dir().join(app_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_paths_layout() {
        let paths = SitePaths::new(Path::new("/data/sitepm"), "site-1");
        assert_eq!(
            paths.apps_file(),
            PathBuf::from("/data/sitepm/sites/site-1/apps.json")
        );
        assert_eq!(
            paths.log_file("abc"),
            PathBuf::from("/data/sitepm/sites/site-1/logs/abc.log")
        );
        assert_eq!(
            paths.app_dir("abc"),
            PathBuf::from("/data/sitepm/sites/site-1/apps/abc")
        );
    }

    #[test]
    fn test_socket_path() {
        let path = socket_path();
        assert!(path.to_string_lossy().contains("daemon.sock"));
    }
}
