//! Error types for sitepm

use std::path::PathBuf;

use crate::types::AppStatus;

/// sitepm error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("App limit reached: a site may hold at most {max} apps")]
    LimitExceeded { max: usize },

    #[error("App not found: {0}")]
    AppNotFound(String),

    #[error("App {0} is busy with another operation")]
    Busy(String),

    #[error("Cannot {action} app while it is {status}")]
    InvalidTransition {
        action: &'static str,
        status: AppStatus,
    },

    #[error("{phase} failed: {message}")]
    Provision { phase: String, message: String },

    #[error("{phase} timed out after {secs}s")]
    PhaseTimeout { phase: String, secs: u64 },

    #[error("Process failed to start: {0}")]
    SpawnFailed(String),

    #[error("No free port available in {start}-{end}")]
    PortsExhausted { start: u16, end: u16 },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Daemon not running")]
    DaemonNotRunning,

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("IPC connection failed: {0}")]
    IpcConnectionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for sitepm
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Error::Validation(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn store<S: Into<String>>(msg: S) -> Self {
        Error::Store(msg.into())
    }

    pub fn ipc<S: Into<String>>(msg: S) -> Self {
        Error::Ipc(msg.into())
    }

    pub fn spawn<S: Into<String>>(msg: S) -> Self {
        Error::SpawnFailed(msg.into())
    }

    pub fn provision<P: Into<String>, S: Into<String>>(phase: P, msg: S) -> Self {
        Error::Provision {
            phase: phase.into(),
            message: msg.into(),
        }
    }

    /// Rejected before any state change
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::LimitExceeded { .. })
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Error::Busy(_))
    }
}
