//! IPC Protocol - Request/Response types

use serde::{Deserialize, Serialize};
use sitepm_core::{App, BulkReport, HealthStatus, NewApp, SiteInfo};
use std::collections::BTreeMap;

/// Log lines returned when a request names no limit
pub const DEFAULT_LOG_LINES: usize = 100;

fn default_log_lines() -> usize {
    DEFAULT_LOG_LINES
}

/// IPC Request from a client to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Check if daemon is alive
    Ping,

    /// Register, provision and start a new app
    AddApp { site: String, app: NewApp },

    RemoveApp { site: String, app_id: String },

    /// Start a stopped or failed app; `reprovision` re-clones first
    StartApp {
        site: String,
        app_id: String,
        #[serde(default)]
        reprovision: bool,
    },

    StopApp { site: String, app_id: String },

    RestartApp { site: String, app_id: String },

    GetApps { site: String },

    GetLogs {
        site: String,
        app_id: String,
        #[serde(default = "default_log_lines")]
        lines: usize,
    },

    /// Replace an app's environment overrides
    UpdateEnv {
        site: String,
        app_id: String,
        env: BTreeMap<String, String>,
    },

    AppHealth { site: String, app_id: String },

    /// The site came up: register its identity and start auto-start apps
    SiteStarted { site: SiteInfo },

    /// The site is going down: stop its apps
    SiteStopping { site: String },

    /// The site is being deleted: remove its apps and data
    SiteDeleting { site: String },

    /// URL/port variables of the site's running apps
    SiteEnv { site: String },
}

/// IPC Response from the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Ping response
    Pong,

    /// Error with a sanitized message
    Error { message: String },

    /// A single app after the operation
    App { app: App },

    Apps { apps: Vec<App> },

    Removed { app_id: String },

    LogLines { lines: Vec<String> },

    Health { health: HealthStatus },

    /// Outcome of a site-wide operation
    Bulk { report: BulkReport },

    Env { env: BTreeMap<String, String> },
}

impl Response {
    pub fn error<S: Into<String>>(message: S) -> Self {
        Response::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Response::Error { message } => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let req = Request::StopApp {
            site: "site-1".to_string(),
            app_id: "abc".to_string(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"type":"stop_app","site":"site-1","app_id":"abc"}"#);
    }

    #[test]
    fn test_add_app_defaults_from_json() {
        let json = r#"{"type":"add_app","site":"site-1","app":{"name":"api","gitUrl":"https://github.com/acme/api.git"}}"#;
        let parsed: Request = serde_json::from_str(json).unwrap();
        match parsed {
            Request::AddApp { site, app } => {
                assert_eq!(site, "site-1");
                assert_eq!(app.name, "api");
                assert_eq!(app.branch, "main");
                assert_eq!(app.start_command, "npm start");
            }
            _ => panic!("Wrong request type"),
        }
    }

    #[test]
    fn test_optional_fields() {
        let parsed: Request =
            serde_json::from_str(r#"{"type":"get_logs","site":"s","app_id":"a"}"#).unwrap();
        assert!(matches!(parsed, Request::GetLogs { lines: DEFAULT_LOG_LINES, .. }));

        let parsed: Request =
            serde_json::from_str(r#"{"type":"start_app","site":"s","app_id":"a"}"#).unwrap();
        assert!(matches!(parsed, Request::StartApp { reprovision: false, .. }));
    }

    #[test]
    fn test_site_started_carries_identity() {
        let req = Request::SiteStarted {
            site: SiteInfo::new("site-1", "Blog"),
        };
        let json = serde_json::to_string(&req).unwrap();
        let parsed: Request = serde_json::from_str(&json).unwrap();
        match parsed {
            Request::SiteStarted { site } => assert_eq!(site.domain, "site-1.local"),
            _ => panic!("Wrong request type"),
        }
    }

    #[test]
    fn test_error_response() {
        let resp = Response::error("App not found: abc");
        assert!(resp.is_error());
        assert_eq!(resp.error_message(), Some("App not found: abc"));

        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"type":"error","message":"App not found: abc"}"#);
        assert!(Response::Pong.error_message().is_none());
    }

    #[test]
    fn test_bulk_response_serialize() {
        let resp = Response::Bulk {
            report: BulkReport {
                succeeded: vec!["a".to_string()],
                failed: Vec::new(),
            },
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""type":"bulk""#));
        assert!(json.contains(r#""a""#));
    }
}
