//! sitepm CLI - manage the Node.js apps of a site

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod output;

use cli::{Cli, Commands};
use commands::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    output::set_json_mode(cli.json);

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("sitepm={},sitepm_ipc={}", log_level, log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time().with_writer(std::io::stderr))
        .init();

    let site = cli.site.as_str();
    let result = match cli.command {
        Commands::Add(args) => add::execute(site, args).await,
        Commands::Remove { app } => lifecycle::remove(site, &app).await,
        Commands::Start { app, reprovision } => lifecycle::start(site, &app, reprovision).await,
        Commands::Stop { app } => lifecycle::stop(site, &app).await,
        Commands::Restart { app } => lifecycle::restart(site, &app).await,
        Commands::List => list::execute(site).await,
        Commands::Logs(args) => logs::execute(site, args).await,
        Commands::Env(args) => env::execute(site, args).await,
        Commands::Health { app } => health::execute(site, &app).await,
        Commands::SiteEnv => site::env(site).await,
        Commands::Site { event } => site::notify(site, event).await,
        Commands::Ping => ping::execute().await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
