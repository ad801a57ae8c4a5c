//! CLI argument definitions

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sitepm")]
#[command(version, about = "Per-site Node.js app manager")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Site the command operates on
    #[arg(short, long, global = true, env = "SITEPM_SITE", default_value = "default")]
    pub site: String,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output in JSON format instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register an app, clone and install it, then start it
    Add(AddArgs),

    /// Stop an app and delete its source, logs and port
    Remove {
        /// App id or name
        app: String,
    },

    /// Start a stopped or failed app
    Start {
        /// App id or name
        app: String,

        /// Clone and install again from scratch
        #[arg(long)]
        reprovision: bool,
    },

    /// Stop a running app
    Stop {
        /// App id or name
        app: String,
    },

    /// Restart an app
    Restart {
        /// App id or name
        app: String,
    },

    /// List the site's apps
    #[command(alias = "ls")]
    List,

    /// Show an app's recent output
    Logs(LogsArgs),

    /// Show or replace an app's environment overrides
    Env(EnvArgs),

    /// Show health check counters of an app
    Health {
        /// App id or name
        app: String,
    },

    /// Print URL/port variables of the site's running apps
    SiteEnv,

    /// Send a site notification to the daemon
    Site {
        #[command(subcommand)]
        event: SiteEvent,
    },

    /// Check daemon health
    Ping,
}

#[derive(Args)]
pub struct AddArgs {
    /// App name, unique within the site
    pub name: String,

    /// Git repository URL
    pub git_url: String,

    #[arg(long, default_value = "main")]
    pub branch: String,

    #[arg(long = "install", default_value = "npm install")]
    pub install_command: String,

    #[arg(long = "build")]
    pub build_command: Option<String>,

    #[arg(long = "start", default_value = "npm start")]
    pub start_command: String,

    /// Node.js version selector
    #[arg(long = "node", default_value = "20.x")]
    pub node_version: String,

    /// Environment variable (KEY=VALUE, repeatable)
    #[arg(long = "env", value_parser = parse_env)]
    pub envs: Vec<(String, String)>,

    /// Inject the site's WordPress variables
    #[arg(long)]
    pub wp_env: bool,

    /// Start with the site
    #[arg(long)]
    pub auto_start: bool,

    /// HTTP health check path or URL
    #[arg(long)]
    pub health: Option<String>,

    #[arg(long, default_value = "30", requires = "health")]
    pub health_interval: u64,

    #[arg(long, default_value = "5", requires = "health")]
    pub health_timeout: u64,

    #[arg(long, default_value = "3", requires = "health")]
    pub health_retries: u32,
}

#[derive(Args)]
pub struct LogsArgs {
    /// App id or name
    pub app: String,

    /// Number of lines to show
    #[arg(short = 'n', long, default_value = "100")]
    pub lines: usize,

    /// Only show lines matching this regex
    #[arg(long)]
    pub grep: Option<String>,
}

#[derive(Args)]
pub struct EnvArgs {
    /// App id or name
    pub app: String,

    /// Variables replacing the current overrides (KEY=VALUE)
    #[arg(value_parser = parse_env)]
    pub vars: Vec<(String, String)>,

    /// Remove every override
    #[arg(long, conflicts_with = "vars")]
    pub clear: bool,
}

#[derive(Subcommand)]
pub enum SiteEvent {
    /// The site came up; starts its auto-start apps
    Started {
        /// Display name of the site
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        domain: Option<String>,

        #[arg(long)]
        url: Option<String>,

        /// Site root on disk
        #[arg(long)]
        path: Option<String>,
    },

    /// The site is going down; stops its apps
    Stopping,

    /// The site is being deleted; removes its apps
    Deleting,
}

/// Parse KEY=VALUE environment variable
fn parse_env(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=').ok_or("Expected KEY=VALUE format")?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_env() {
        let (key, value) = parse_env("FOO=bar").unwrap();
        assert_eq!(key, "FOO");
        assert_eq!(value, "bar");

        let (key, value) = parse_env("COMPLEX_VAR=value=with=equals").unwrap();
        assert_eq!(key, "COMPLEX_VAR");
        assert_eq!(value, "value=with=equals");

        assert!(parse_env("NO_EQUALS").is_err());
    }

    #[test]
    fn test_add_defaults() {
        let cli = Cli::try_parse_from([
            "sitepm",
            "--site",
            "blog",
            "add",
            "api",
            "https://github.com/acme/api.git",
            "--env",
            "A=1",
        ])
        .unwrap();

        assert_eq!(cli.site, "blog");
        match cli.command {
            Commands::Add(args) => {
                assert_eq!(args.branch, "main");
                assert_eq!(args.start_command, "npm start");
                assert_eq!(args.envs, vec![("A".to_string(), "1".to_string())]);
                assert!(args.health.is_none());
            }
            _ => panic!("Wrong command"),
        }
    }

    #[test]
    fn test_health_options_require_health() {
        assert!(Cli::try_parse_from([
            "sitepm",
            "add",
            "api",
            "https://github.com/acme/api.git",
            "--health-retries",
            "5",
        ])
        .is_err());
    }

    #[test]
    fn test_env_clear_conflicts_with_vars() {
        assert!(Cli::try_parse_from(["sitepm", "env", "api", "A=1", "--clear"]).is_err());
        assert!(Cli::try_parse_from(["sitepm", "env", "api", "--clear"]).is_ok());
    }
}
