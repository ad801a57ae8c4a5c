//! Start, stop, restart and remove commands

use anyhow::Result;
use sitepm_ipc::{Request, Response};

use crate::output::{is_json_mode, print_app_detail, print_json, print_success};

pub async fn start(site: &str, selector: &str, reprovision: bool) -> Result<()> {
    let client = super::get_client();
    let app = super::resolve_app(&client, site, selector).await?;

    let response = client
        .send(&Request::StartApp {
            site: site.to_string(),
            app_id: app.id,
            reprovision,
        })
        .await?;
    report("Started", response)
}

pub async fn stop(site: &str, selector: &str) -> Result<()> {
    let client = super::get_client();
    let app = super::resolve_app(&client, site, selector).await?;

    let response = client
        .send(&Request::StopApp {
            site: site.to_string(),
            app_id: app.id,
        })
        .await?;
    report("Stopped", response)
}

pub async fn restart(site: &str, selector: &str) -> Result<()> {
    let client = super::get_client();
    let app = super::resolve_app(&client, site, selector).await?;

    let response = client
        .send(&Request::RestartApp {
            site: site.to_string(),
            app_id: app.id,
        })
        .await?;
    report("Restarted", response)
}

pub async fn remove(site: &str, selector: &str) -> Result<()> {
    let client = super::get_client();
    let app = super::resolve_app(&client, site, selector).await?;

    let response = client
        .send(&Request::RemoveApp {
            site: site.to_string(),
            app_id: app.id,
        })
        .await?;

    match response {
        Response::Removed { app_id } => {
            if is_json_mode() {
                print_json(&serde_json::json!({ "removed": app_id }));
            } else {
                print_success(&format!("Removed '{}'", app.name));
            }
            Ok(())
        }
        other => Err(super::daemon_error(other)),
    }
}

fn report(action: &str, response: Response) -> Result<()> {
    match response {
        Response::App { app } => {
            if is_json_mode() {
                print_app_detail(&app);
            } else {
                print_success(&format!("{} '{}' ({})", action, app.name, app.status));
            }
            Ok(())
        }
        other => Err(super::daemon_error(other)),
    }
}
