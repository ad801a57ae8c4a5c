//! List command implementation

use anyhow::Result;
use sitepm_ipc::{Request, Response};

use crate::output::print_apps_table;

pub async fn execute(site: &str) -> Result<()> {
    let client = super::get_client();

    let response = client
        .send(&Request::GetApps {
            site: site.to_string(),
        })
        .await?;

    match response {
        Response::Apps { apps } => {
            print_apps_table(&apps);
            Ok(())
        }
        other => Err(super::daemon_error(other)),
    }
}
