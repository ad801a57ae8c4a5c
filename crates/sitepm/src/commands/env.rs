//! Env command implementation

use anyhow::Result;
use sitepm_ipc::{Request, Response};
use std::collections::BTreeMap;

use crate::cli::EnvArgs;
use crate::output::{is_json_mode, print_env, print_success};

pub async fn execute(site: &str, args: EnvArgs) -> Result<()> {
    let client = super::get_client();
    let app = super::resolve_app(&client, site, &args.app).await?;

    if args.vars.is_empty() && !args.clear {
        print_env(&app.env);
        return Ok(());
    }

    let env: BTreeMap<String, String> = args.vars.into_iter().collect();
    let response = client
        .send(&Request::UpdateEnv {
            site: site.to_string(),
            app_id: app.id,
            env,
        })
        .await?;

    match response {
        Response::App { app } => {
            if is_json_mode() {
                print_env(&app.env);
            } else {
                print_success(&format!(
                    "Updated {} variables of '{}' ({})",
                    app.env.len(),
                    app.name,
                    app.status
                ));
            }
            Ok(())
        }
        other => Err(super::daemon_error(other)),
    }
}
