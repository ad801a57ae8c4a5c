//! Command implementations

pub mod add;
pub mod env;
pub mod health;
pub mod lifecycle;
pub mod list;
pub mod logs;
pub mod ping;
pub mod site;

use anyhow::{anyhow, Result};
use sitepm_core::{constants, App};
use sitepm_ipc::{IpcClient, Request, Response};
use tracing::debug;

use crate::output::print_error;

/// Get the IPC client
pub fn get_client() -> IpcClient {
    IpcClient::new(constants::socket_path())
}

/// Report a response that is not the expected payload
pub fn daemon_error(response: Response) -> anyhow::Error {
    match response {
        Response::Error { message } => {
            print_error(&message);
            anyhow!(message)
        }
        _ => {
            print_error("Unexpected response from daemon");
            anyhow!("Unexpected response")
        }
    }
}

/// Look an app up by id, name or unique id prefix
pub async fn resolve_app(client: &IpcClient, site: &str, selector: &str) -> Result<App> {
    let response = client
        .send(&Request::GetApps {
            site: site.to_string(),
        })
        .await?;

    let apps = match response {
        Response::Apps { apps } => apps,
        other => return Err(daemon_error(other)),
    };

    let app = find_app(apps, selector).ok_or_else(|| {
        print_error(&format!("No app '{}' in site {}", selector, site));
        anyhow!("App not found: {}", selector)
    })?;
    debug!("Resolved '{}' to {}", selector, app.id);
    Ok(app)
}

fn find_app(apps: Vec<App>, selector: &str) -> Option<App> {
    if let Some(pos) = apps
        .iter()
        .position(|a| a.id == selector || a.name == selector)
    {
        return apps.into_iter().nth(pos);
    }

    let mut prefixed: Vec<App> = apps
        .into_iter()
        .filter(|a| a.id.starts_with(selector))
        .collect();
    if prefixed.len() == 1 {
        prefixed.pop()
    } else {
        None
    }
}
