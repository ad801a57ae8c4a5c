//! IPC request handlers

use sitepm_core::{sanitize_error, Error};
use sitepm_ipc::{Request, Response};
use sitepm_lifecycle::LifecycleController;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Maps requests onto controller operations
pub struct RequestHandler {
    controller: Arc<LifecycleController>,
}

impl RequestHandler {
    pub fn new(controller: Arc<LifecycleController>) -> Self {
        Self { controller }
    }

    pub async fn handle(&self, request: Request) -> Response {
        let c = &self.controller;

        match request {
            Request::Ping => Response::Pong,

            Request::AddApp { site, app } => {
                info!("Adding app '{}' to site {}", app.name, site);
                respond(c.add(&site, app).await.map(|app| Response::App { app }))
            }

            Request::RemoveApp { site, app_id } => {
                info!("Removing app {} from site {}", app_id, site);
                respond(
                    c.remove(&site, &app_id)
                        .await
                        .map(|()| Response::Removed { app_id }),
                )
            }

            Request::StartApp {
                site,
                app_id,
                reprovision,
            } => respond(
                c.start_with(&site, &app_id, reprovision)
                    .await
                    .map(|app| Response::App { app }),
            ),

            Request::StopApp { site, app_id } => {
                respond(c.stop(&site, &app_id).await.map(|app| Response::App { app }))
            }

            Request::RestartApp { site, app_id } => {
                respond(c.restart(&site, &app_id).await.map(|app| Response::App { app }))
            }

            Request::GetApps { site } => {
                respond(c.get_apps(&site).await.map(|apps| Response::Apps { apps }))
            }

            Request::GetLogs {
                site,
                app_id,
                lines,
            } => respond(
                c.get_logs(&site, &app_id, lines)
                    .await
                    .map(|lines| Response::LogLines { lines }),
            ),

            Request::UpdateEnv { site, app_id, env } => respond(
                c.update_env(&site, &app_id, env)
                    .await
                    .map(|app| Response::App { app }),
            ),

            Request::AppHealth { site, app_id } => respond(
                c.health(&site, &app_id)
                    .await
                    .map(|health| Response::Health { health }),
            ),

            Request::SiteStarted { site } => {
                info!("Site {} started", site.id);
                respond(bulk(c.on_site_started(site).await))
            }

            Request::SiteStopping { site } => {
                info!("Site {} stopping", site);
                respond(bulk(c.on_site_stopping(&site).await))
            }

            Request::SiteDeleting { site } => {
                info!("Site {} deleting", site);
                respond(bulk(c.on_site_deleting(&site).await))
            }

            Request::SiteEnv { site } => {
                respond(c.site_env(&site).await.map(|env| Response::Env { env }))
            }
        }
    }
}

fn bulk(result: sitepm_core::Result<sitepm_core::BulkReport>) -> sitepm_core::Result<Response> {
    result.map(|report| {
        if !report.is_clean() {
            warn!("{} apps failed the site operation", report.failed.len());
        }
        Response::Bulk { report }
    })
}

/// Errors leave the daemon sanitized; the full text stays in its log
fn respond(result: sitepm_core::Result<Response>) -> Response {
    match result {
        Ok(response) => response,
        Err(e) => {
            match &e {
                Error::Validation(_) | Error::LimitExceeded { .. } | Error::Busy(_) => {
                    warn!("Request rejected: {}", e)
                }
                _ => error!("Request failed: {}", e),
            }
            Response::error(sanitize_error(&e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitepm_core::{NewApp, Settings, SiteInfo};
    use sitepm_lifecycle::Collaborators;
    use tempfile::TempDir;

    fn handler(dir: &TempDir) -> RequestHandler {
        let controller =
            LifecycleController::new(Settings::with_home(dir.path()), Collaborators::default());
        RequestHandler::new(controller)
    }

    #[tokio::test]
    async fn test_ping() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(handler(&dir).handle(Request::Ping).await, Response::Pong));
    }

    #[tokio::test]
    async fn test_empty_site() {
        let dir = TempDir::new().unwrap();
        let handler = handler(&dir);

        let response = handler
            .handle(Request::GetApps {
                site: "site-1".to_string(),
            })
            .await;
        assert!(matches!(response, Response::Apps { apps } if apps.is_empty()));

        let response = handler
            .handle(Request::SiteEnv {
                site: "site-1".to_string(),
            })
            .await;
        assert!(matches!(response, Response::Env { env } if env.is_empty()));

        let response = handler
            .handle(Request::SiteStarted {
                site: SiteInfo::new("site-1", "Blog"),
            })
            .await;
        assert!(matches!(response, Response::Bulk { report } if report.is_clean()));
    }

    #[tokio::test]
    async fn test_errors_become_responses() {
        let dir = TempDir::new().unwrap();
        let handler = handler(&dir);

        let response = handler
            .handle(Request::StopApp {
                site: "site-1".to_string(),
                app_id: "missing".to_string(),
            })
            .await;
        assert_eq!(response.error_message(), Some("App not found: missing"));

        let response = handler
            .handle(Request::AddApp {
                site: "site-1".to_string(),
                app: NewApp::new("", "https://github.com/acme/api.git"),
            })
            .await;
        assert!(response.is_error());
    }

    #[test]
    fn test_messages_sanitized() {
        let response = respond(Err(Error::provision(
            "installing",
            "cannot open /home/dev/.sitepm/sites/s/apps/a/package.json",
        )));
        let message = response.error_message().unwrap();
        assert!(message.starts_with("installing failed"));
        assert!(!message.contains("/home/dev"));
        assert!(message.contains("package.json"));
    }
}
