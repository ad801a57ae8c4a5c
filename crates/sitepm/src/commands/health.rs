//! Health command implementation

use anyhow::Result;
use sitepm_ipc::{Request, Response};

use crate::output::print_health;

pub async fn execute(site: &str, selector: &str) -> Result<()> {
    let client = super::get_client();
    let app = super::resolve_app(&client, site, selector).await?;

    let response = client
        .send(&Request::AppHealth {
            site: site.to_string(),
            app_id: app.id,
        })
        .await?;

    match response {
        Response::Health { health } => {
            print_health(&health);
            Ok(())
        }
        other => Err(super::daemon_error(other)),
    }
}
