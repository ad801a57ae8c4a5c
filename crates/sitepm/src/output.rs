//! Table and JSON output formatting

use chrono::Utc;
use colored::Colorize;
use serde::Serialize;
use sitepm_core::{App, AppStatus, BulkReport, HealthStatus};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

/// Global flag for JSON output mode
static JSON_MODE: AtomicBool = AtomicBool::new(false);

pub fn set_json_mode(enabled: bool) {
    JSON_MODE.store(enabled, Ordering::SeqCst);
}

pub fn is_json_mode() -> bool {
    JSON_MODE.load(Ordering::SeqCst)
}

/// Characters of an app id shown in tables
const SHORT_ID_LEN: usize = 8;

#[derive(Tabled)]
pub struct AppRow {
    #[tabled(rename = "id")]
    pub id: String,
    #[tabled(rename = "name")]
    pub name: String,
    #[tabled(rename = "status")]
    pub status: String,
    #[tabled(rename = "port")]
    pub port: String,
    #[tabled(rename = "pid")]
    pub pid: String,
    #[tabled(rename = "uptime")]
    pub uptime: String,
    #[tabled(rename = "branch")]
    pub branch: String,
}

impl From<&App> for AppRow {
    fn from(app: &App) -> Self {
        AppRow {
            id: short_id(&app.id),
            name: app.name.clone(),
            status: format_status(app.status),
            port: dash(app.port),
            pid: dash(app.pid),
            uptime: uptime_secs(app)
                .map(format_duration)
                .unwrap_or_else(|| "-".to_string()),
            branch: app.branch.clone(),
        }
    }
}

fn dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

fn uptime_secs(app: &App) -> Option<u64> {
    if app.status != AppStatus::Running {
        return None;
    }
    app.started_at
        .map(|started| (Utc::now() - started).num_seconds().max(0) as u64)
}

/// Pretty JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing to JSON: {}", e),
    }
}

pub fn print_apps_table(apps: &[App]) {
    if is_json_mode() {
        print_json(apps);
        return;
    }

    if apps.is_empty() {
        println!("No apps registered for this site");
        return;
    }

    let rows: Vec<AppRow> = apps.iter().map(AppRow::from).collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(3)).with(Alignment::right()))
        .to_string();

    println!("{}", table);
}

pub fn print_app_detail(app: &App) {
    if is_json_mode() {
        print_json(app);
        return;
    }

    println!("{}", "─".repeat(50));
    println!("  {} │ {}", "Name".bold(), app.name);
    println!("  {} │ {}", "ID".bold(), app.id);
    println!("  {} │ {}", "Status".bold(), format_status(app.status));
    println!("  {} │ {}", "Port".bold(), dash(app.port));
    println!("  {} │ {}", "PID".bold(), dash(app.pid));
    if let Some(secs) = uptime_secs(app) {
        println!("  {} │ {}", "Uptime".bold(), format_duration(secs));
    }
    println!("{}", "─".repeat(50));
    println!("  {} │ {} ({})", "Repo".bold(), app.git_url, app.branch);
    println!("  {} │ {}", "Install".bold(), app.install_command);
    if let Some(build) = &app.build_command {
        println!("  {} │ {}", "Build".bold(), build);
    }
    println!("  {} │ {}", "Start".bold(), app.start_command);
    println!("  {} │ {}", "Node".bold(), app.node_version);
    if app.auto_start {
        println!("  {} │ enabled", "Auto start".bold());
    }
    if let Some(check) = app.health_check.as_ref().filter(|hc| hc.enabled) {
        println!(
            "  {} │ {} every {}s",
            "Health".bold(),
            check.endpoint,
            check.interval_secs
        );
    }
    if let Some(err) = &app.last_error {
        println!("  {} │ {}", "Last error".bold(), err.red());
    }
    println!("{}", "─".repeat(50));
}

pub fn print_health(health: &HealthStatus) {
    if is_json_mode() {
        print_json(health);
        return;
    }

    if !health.monitored {
        print_info("Health checks are not running for this app");
        return;
    }

    let state = if health.healthy {
        "healthy".green()
    } else {
        "unhealthy".red()
    };
    println!("  {} │ {}", "State".bold(), state);
    println!(
        "  {} │ {} in a row, {} total",
        "Failures".bold(),
        health.consecutive_failures,
        health.total_failures
    );
    println!("  {} │ {}", "Threshold hits".bold(), health.threshold_signals);
    if let Some(at) = health.last_check {
        println!("  {} │ {}", "Last check".bold(), at.to_rfc3339());
    }
    if let Some(message) = &health.last_message {
        println!("  {} │ {}", "Last message".bold(), message);
    }
}

/// `KEY=VALUE` lines, or a JSON object
pub fn print_env(env: &BTreeMap<String, String>) {
    if is_json_mode() {
        print_json(env);
        return;
    }
    for (key, value) in env {
        println!("{}={}", key, value);
    }
}

/// Per-app outcome of a site operation. Returns false if anything failed.
pub fn print_bulk(action: &str, report: &BulkReport) -> bool {
    if is_json_mode() {
        print_json(report);
        return report.is_clean();
    }

    if report.succeeded.is_empty() && report.failed.is_empty() {
        print_info(&format!("No apps to {}", action));
    }
    for id in &report.succeeded {
        print_success(&format!("{} {}", action, short_id(id)));
    }
    for failure in &report.failed {
        print_error(&format!("{}: {}", short_id(&failure.app_id), failure.error));
    }
    report.is_clean()
}

fn format_status(status: AppStatus) -> String {
    match status {
        AppStatus::Running => "running".green().to_string(),
        AppStatus::Stopped => "stopped".dimmed().to_string(),
        AppStatus::Error => "error".red().bold().to_string(),
        AppStatus::Cloning | AppStatus::Installing | AppStatus::Building => {
            status.as_str().cyan().to_string()
        }
        AppStatus::Starting | AppStatus::Stopping | AppStatus::Restarting => {
            status.as_str().yellow().to_string()
        }
    }
}

pub fn format_duration(secs: u64) -> String {
    if secs >= 86400 {
        let days = secs / 86400;
        let hours = (secs % 86400) / 3600;
        format!("{}d {}h", days, hours)
    } else if secs >= 3600 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        format!("{}h {}m", hours, mins)
    } else if secs >= 60 {
        let mins = secs / 60;
        let s = secs % 60;
        format!("{}m {}s", mins, s)
    } else {
        format!("{}s", secs)
    }
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

pub fn print_logs(lines: &[String]) {
    if is_json_mode() {
        print_json(lines);
        return;
    }

    for line in lines {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitepm_core::NewApp;

    fn running_app() -> App {
        let mut app = NewApp::new("api", "https://github.com/acme/api.git").into_app();
        app.status = AppStatus::Running;
        app.port = Some(3001);
        app.pid = Some(4242);
        app.started_at = Some(Utc::now() - chrono::Duration::seconds(90));
        app
    }

    #[test]
    fn test_json_mode_toggle() {
        set_json_mode(false);
        assert!(!is_json_mode());

        set_json_mode(true);
        assert!(is_json_mode());

        set_json_mode(false);
        assert!(!is_json_mode());
    }

    #[test]
    fn test_row_from_running_app() {
        colored::control::set_override(false);
        let app = running_app();
        let row = AppRow::from(&app);

        assert_eq!(row.id.len(), SHORT_ID_LEN);
        assert_eq!(row.name, "api");
        assert_eq!(row.status, "running");
        assert_eq!(row.port, "3001");
        assert_eq!(row.pid, "4242");
        assert!(row.uptime.starts_with("1m"));
    }

    #[test]
    fn test_row_from_stopped_app() {
        let mut app = running_app();
        app.status = AppStatus::Stopped;
        app.pid = None;
        let row = AppRow::from(&app);

        assert_eq!(row.pid, "-");
        assert_eq!(row.uptime, "-");
        assert_eq!(row.port, "3001");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(60), "1m 0s");
        assert_eq!(format_duration(3599), "59m 59s");
        assert_eq!(format_duration(3600), "1h 0m");
        assert_eq!(format_duration(3661), "1h 1m");
        assert_eq!(format_duration(86400), "1d 0h");
        assert_eq!(format_duration(90061), "1d 1h");
    }
}
