//! Add command implementation

use anyhow::Result;
use sitepm_core::{HealthCheck, NewApp};
use sitepm_ipc::{Request, Response};

use crate::cli::AddArgs;
use crate::output::{is_json_mode, print_app_detail, print_info, print_success};

pub async fn execute(site: &str, args: AddArgs) -> Result<()> {
    let client = super::get_client();
    let app = new_app(args);

    if !is_json_mode() {
        print_info(&format!("Cloning and installing '{}', this may take a while...", app.name));
    }

    let response = client
        .send(&Request::AddApp {
            site: site.to_string(),
            app,
        })
        .await?;

    match response {
        Response::App { app } => {
            if !is_json_mode() {
                print_success(&format!("Added '{}' on port {}", app.name, app.port.unwrap_or_default()));
            }
            print_app_detail(&app);
            Ok(())
        }
        other => Err(super::daemon_error(other)),
    }
}

fn new_app(args: AddArgs) -> NewApp {
    let mut app = NewApp::new(args.name, args.git_url)
        .with_branch(args.branch)
        .with_install_command(args.install_command)
        .with_start_command(args.start_command)
        .with_node_version(args.node_version)
        .with_env(args.envs.into_iter().collect())
        .with_auto_start(args.auto_start);

    if let Some(build) = args.build_command {
        app = app.with_build_command(build);
    }
    if let Some(endpoint) = args.health {
        app = app.with_health_check(HealthCheck {
            interval_secs: args.health_interval,
            timeout_secs: args.health_timeout,
            retries: args.health_retries,
            ..HealthCheck::http(endpoint)
        });
    }
    app.inject_wp_env = args.wp_env;
    app
}
