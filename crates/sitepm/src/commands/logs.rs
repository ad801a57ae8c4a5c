//! Logs command implementation

use anyhow::Result;
use regex::Regex;
use sitepm_ipc::{Request, Response};

use crate::cli::LogsArgs;
use crate::output::print_logs;

pub async fn execute(site: &str, args: LogsArgs) -> Result<()> {
    let client = super::get_client();

    let grep_regex = match &args.grep {
        Some(pattern) => {
            Some(Regex::new(pattern).map_err(|e| anyhow::anyhow!("Invalid regex pattern: {}", e))?)
        }
        None => None,
    };

    let app = super::resolve_app(&client, site, &args.app).await?;
    let response = client
        .send(&Request::GetLogs {
            site: site.to_string(),
            app_id: app.id,
            lines: args.lines,
        })
        .await?;

    match response {
        Response::LogLines { lines } => {
            let filtered: Vec<String> = match grep_regex {
                Some(regex) => lines.into_iter().filter(|l| regex.is_match(l)).collect(),
                None => lines,
            };
            print_logs(&filtered);
            Ok(())
        }
        other => Err(super::daemon_error(other)),
    }
}
