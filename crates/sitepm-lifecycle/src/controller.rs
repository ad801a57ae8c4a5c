//! Lifecycle controller - the per-app state machine
//!
//! Every public operation takes the app's single-flight slot before reading
//! its status; a second operation on the same app fails with `Busy` instead
//! of queueing. Each status transition is persisted before the next step.

use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use sitepm_core::{
    export_name, sanitize_error, validate_env, App, AppKey, AppStatus, BulkFailure, BulkReport,
    Error, HealthStatus, NewApp, Result, Settings, SiteInfo,
};
use sitepm_logs::{LogReader, RotationConfig};
use sitepm_runtime::{
    GitCli, NoWordPress, NodeLocator, SourceControl, SystemNode, VersionDirNode, WordPressEnv,
};
use sitepm_store::ConfigStore;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::env::{self, EnvInputs};
use crate::monitor::{HealthRegistry, HealthSignal};
use crate::ports::PortAllocator;
use crate::provision::Pipeline;
use crate::supervisor::{ProcessExit, Supervisor, SupervisorConfig, Termination};

/// Recent output lines attached to apps handed to callers
pub const APP_LOG_PREVIEW_LINES: usize = 100;

/// External systems the controller delegates to
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn SourceControl>,
    pub node: Arc<dyn NodeLocator>,
    pub wordpress: Arc<dyn WordPressEnv>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            source: Arc::new(GitCli),
            node: Arc::new(SystemNode),
            wordpress: Arc::new(NoWordPress),
        }
    }
}

impl Collaborators {
    /// Defaults, with per-version Node.js lookup when the settings name a
    /// versions directory
    pub fn from_settings(settings: &Settings) -> Self {
        let node: Arc<dyn NodeLocator> = match &settings.node_versions_dir {
            Some(dir) => Arc::new(VersionDirNode::new(dir)),
            None => Arc::new(SystemNode),
        };
        Self {
            node,
            ..Default::default()
        }
    }
}

/// A persisted status transition
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub key: AppKey,
    pub status: AppStatus,
}

#[derive(Default)]
struct InFlight {
    keys: Mutex<HashSet<AppKey>>,
}

impl InFlight {
    fn acquire(&self, key: &AppKey) -> Result<FlightGuard<'_>> {
        if !self.keys.lock().insert(key.clone()) {
            return Err(Error::Busy(key.app_id.clone()));
        }
        Ok(FlightGuard {
            keys: &self.keys,
            key: key.clone(),
        })
    }
}

struct FlightGuard<'a> {
    keys: &'a Mutex<HashSet<AppKey>>,
    key: AppKey,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.keys.lock().remove(&self.key);
    }
}

pub struct LifecycleController {
    settings: Settings,
    store: ConfigStore,
    ports: PortAllocator,
    supervisor: Supervisor,
    health: HealthRegistry,
    pipeline: Pipeline,
    node: Arc<dyn NodeLocator>,
    wordpress: Arc<dyn WordPressEnv>,
    sites: Mutex<HashMap<String, SiteInfo>>,
    in_flight: InFlight,
    changes: broadcast::Sender<StatusChange>,
}

impl LifecycleController {
    /// Build the controller and start its event loop. Must run inside a
    /// tokio runtime.
    pub fn new(settings: Settings, collaborators: Collaborators) -> Arc<Self> {
        let (supervisor, exits) = Supervisor::new(SupervisorConfig::from_settings(&settings));
        let (health, signals) = HealthRegistry::new();
        let (changes, _) = broadcast::channel(256);

        let controller = Arc::new(Self {
            store: ConfigStore::new(settings.home.clone()),
            ports: PortAllocator::from_settings(&settings),
            pipeline: Pipeline::new(collaborators.source, &settings),
            node: collaborators.node,
            wordpress: collaborators.wordpress,
            supervisor,
            health,
            sites: Mutex::new(HashMap::new()),
            in_flight: InFlight::default(),
            changes,
            settings,
        });

        Self::spawn_event_loop(Arc::downgrade(&controller), exits, signals);
        controller
    }

    fn spawn_event_loop(
        controller: Weak<Self>,
        mut exits: mpsc::UnboundedReceiver<ProcessExit>,
        mut signals: mpsc::UnboundedReceiver<HealthSignal>,
    ) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(exit) = exits.recv() => {
                        let Some(controller) = controller.upgrade() else { break };
                        controller.handle_exit(exit).await;
                    }
                    Some(signal) = signals.recv() => {
                        let Some(controller) = controller.upgrade() else { break };
                        controller.handle_health_signal(signal);
                    }
                    else => break,
                }
            }
            debug!("Lifecycle event loop ended");
        });
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Status transitions as they are persisted
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.changes.subscribe()
    }

    // ---- sites ----

    pub fn register_site(&self, site: SiteInfo) {
        info!("Site {} registered", site.id);
        self.sites.lock().insert(site.id.clone(), site);
    }

    pub fn unregister_site(&self, site_id: &str) {
        self.sites.lock().remove(site_id);
    }

    /// Registered identity, or a minimal one derived from the id
    pub fn site_info(&self, site_id: &str) -> SiteInfo {
        self.sites
            .lock()
            .get(site_id)
            .cloned()
            .unwrap_or_else(|| SiteInfo::new(site_id, site_id))
    }

    // ---- startup ----

    /// Bring persisted state in line with a fresh process: no handle survived,
    /// so transient statuses become stable and leases are re-established.
    /// Returns the number of apps whose status changed.
    pub async fn reconcile(&self) -> Result<usize> {
        let mut changed = 0;

        for site_id in self.store.list_sites()? {
            let result = self
                .store
                .update(&site_id, |apps| {
                    let mut count = 0;
                    for app in apps.apps.iter_mut() {
                        if app.reconcile_after_restart() {
                            count += 1;
                        }
                    }
                    Ok((count, apps.apps.clone()))
                })
                .await;

            let (count, apps) = match result {
                Ok(out) => out,
                Err(e) => {
                    warn!("Failed to reconcile site {}: {}", site_id, e);
                    continue;
                }
            };
            changed += count;

            for app in apps {
                let Some(port) = app.port else { continue };
                if self.ports.reserve(&site_id, &app.id, port) {
                    continue;
                }
                warn!(
                    "Port {} of {}/{} is leased twice, dropping it",
                    port, site_id, app.id
                );
                if let Err(e) = self
                    .store
                    .update_app(&site_id, &app.id, |app| app.port = None)
                    .await
                {
                    warn!("Failed to clear port of {}/{}: {}", site_id, app.id, e);
                }
            }
        }

        if changed > 0 {
            info!("Reconciled {} apps after restart", changed);
        }
        Ok(changed)
    }

    // ---- lifecycle operations ----

    /// Register, provision and start a new app. On a provisioning or start
    /// failure the entry stays in `error` and the error is returned.
    pub async fn add(&self, site_id: &str, new: NewApp) -> Result<App> {
        new.validate()?;

        let app = new.into_app();
        let key = AppKey::new(site_id, &app.id);
        let _guard = self.in_flight.acquire(&key)?;

        let max = self.settings.max_apps_per_site;
        let entry = app.clone();
        self.store
            .update(site_id, move |apps| {
                if apps.len() >= max {
                    return Err(Error::LimitExceeded { max });
                }
                if let Some(existing) = apps.name_conflict(&entry.name) {
                    let message = if existing.name == entry.name.trim() {
                        format!("An app named '{}' already exists", entry.name)
                    } else {
                        format!(
                            "App name '{}' clashes with '{}' in APP_{}_* variables",
                            entry.name,
                            existing.name,
                            export_name(&entry.name)
                        )
                    };
                    return Err(Error::validation(message));
                }
                apps.upsert(entry);
                Ok(())
            })
            .await?;

        info!("Added app '{}' ({}) to site {}", app.name, app.id, site_id);
        self.announce(&key, AppStatus::Cloning);

        self.bring_up(&key, false).await
    }

    pub async fn start(&self, site_id: &str, app_id: &str) -> Result<App> {
        self.start_with(site_id, app_id, false).await
    }

    /// Start a stopped or failed app; `reprovision` re-runs every
    /// provisioning phase from a fresh clone first
    pub async fn start_with(&self, site_id: &str, app_id: &str, reprovision: bool) -> Result<App> {
        let key = AppKey::new(site_id, app_id);
        let _guard = self.in_flight.acquire(&key)?;
        let app = self.require(&key).await?;

        match app.status {
            AppStatus::Running if !reprovision => return Ok(self.with_logs(site_id, app)),
            AppStatus::Stopped | AppStatus::Error => {}
            status => {
                return Err(Error::InvalidTransition {
                    action: "start",
                    status,
                })
            }
        }

        self.bring_up(&key, reprovision).await
    }

    /// Stop a running app. Stopping a stopped app is a no-op.
    pub async fn stop(&self, site_id: &str, app_id: &str) -> Result<App> {
        let key = AppKey::new(site_id, app_id);
        let _guard = self.in_flight.acquire(&key)?;
        let app = self.require(&key).await?;

        match app.status {
            AppStatus::Stopped | AppStatus::Error => return Ok(self.with_logs(site_id, app)),
            AppStatus::Running | AppStatus::Starting => {}
            status => {
                return Err(Error::InvalidTransition {
                    action: "stop",
                    status,
                })
            }
        }

        self.halt(&key).await?;
        let app = self.require(&key).await?;
        Ok(self.with_logs(site_id, app))
    }

    pub async fn restart(&self, site_id: &str, app_id: &str) -> Result<App> {
        let key = AppKey::new(site_id, app_id);
        let _guard = self.in_flight.acquire(&key)?;
        let app = self.require(&key).await?;
        self.restart_locked(&key, app).await
    }

    /// Stop and delete an app with its source, logs and port
    pub async fn remove(&self, site_id: &str, app_id: &str) -> Result<()> {
        let key = AppKey::new(site_id, app_id);
        let _guard = self.in_flight.acquire(&key)?;
        let app = self.require(&key).await?;

        if app.status.is_active() || self.supervisor.is_running(&key) {
            self.halt(&key).await?;
        }
        self.health.stop(&key);

        self.purge_files(&key);
        self.ports.release(site_id, app_id);
        self.store.remove(site_id, app_id).await?;

        info!("Removed app '{}' ({}) from site {}", app.name, app_id, site_id);
        Ok(())
    }

    /// Replace the app's environment overrides; a running app is restarted
    pub async fn update_env(
        &self,
        site_id: &str,
        app_id: &str,
        env: BTreeMap<String, String>,
    ) -> Result<App> {
        validate_env(&env)?;

        let key = AppKey::new(site_id, app_id);
        let _guard = self.in_flight.acquire(&key)?;
        let app = self
            .store
            .update_app(site_id, app_id, move |app| {
                app.env = env;
                app.clone()
            })
            .await?;
        info!("Updated environment of {}", key);

        if app.status == AppStatus::Running {
            return self.restart_locked(&key, app).await;
        }
        Ok(self.with_logs(site_id, app))
    }

    // ---- queries ----

    pub async fn get_apps(&self, site_id: &str) -> Result<Vec<App>> {
        let apps = self.store.load(site_id).await?;
        Ok(apps
            .apps
            .into_iter()
            .map(|app| self.with_logs(site_id, app))
            .collect())
    }

    pub async fn get_app(&self, site_id: &str, app_id: &str) -> Result<App> {
        let app = self.require(&AppKey::new(site_id, app_id)).await?;
        Ok(self.with_logs(site_id, app))
    }

    /// Last `limit` log lines: from memory when it holds enough, else from
    /// the log file
    pub async fn get_logs(&self, site_id: &str, app_id: &str, limit: usize) -> Result<Vec<String>> {
        let key = AppKey::new(site_id, app_id);
        self.require(&key).await?;

        let path = self.supervisor.log_path(site_id, app_id);
        if let Some(lines) = self.supervisor.recent_logs(&key, limit) {
            if lines.len() >= limit || !path.exists() {
                return Ok(lines);
            }
        }
        LogReader::new(path, RotationConfig::from_settings(&self.settings)).tail(limit)
    }

    pub async fn health(&self, site_id: &str, app_id: &str) -> Result<HealthStatus> {
        let key = AppKey::new(site_id, app_id);
        self.require(&key).await?;
        Ok(self.health.status(&key))
    }

    /// `APP_<NAME>_URL` / `APP_<NAME>_PORT` of the site's running apps
    pub async fn site_env(&self, site_id: &str) -> Result<BTreeMap<String, String>> {
        let apps = self.store.load(site_id).await?;
        Ok(env::exported_env(&apps.apps))
    }

    // ---- site-wide operations ----

    pub async fn start_autostart(&self, site_id: &str) -> Result<BulkReport> {
        let apps = self.store.load(site_id).await?;
        let targets = apps
            .apps
            .iter()
            .filter(|a| a.auto_start && matches!(a.status, AppStatus::Stopped | AppStatus::Error))
            .map(|a| a.id.clone())
            .collect();

        Ok(fan_out(targets, |id| async move {
            self.start(site_id, &id).await.map(|_| ())
        })
        .await)
    }

    pub async fn stop_all(&self, site_id: &str) -> Result<BulkReport> {
        let apps = self.store.load(site_id).await?;
        let targets = apps
            .apps
            .iter()
            .filter(|a| {
                a.status.is_active() || self.supervisor.is_running(&AppKey::new(site_id, &a.id))
            })
            .map(|a| a.id.clone())
            .collect();

        Ok(fan_out(targets, |id| async move {
            self.stop(site_id, &id).await.map(|_| ())
        })
        .await)
    }

    /// Remove every app of the site. The site record is purged only when
    /// every removal succeeded.
    pub async fn remove_all(&self, site_id: &str) -> Result<BulkReport> {
        let apps = self.store.load(site_id).await?;
        let targets = apps.apps.iter().map(|a| a.id.clone()).collect();

        let report = fan_out(targets, |id| async move { self.remove(site_id, &id).await }).await;

        if report.is_clean() {
            self.store.purge(site_id).await?;
            self.ports.release_site(site_id);
            let paths = self.settings.site_paths(site_id);
            for dir in [paths.apps_dir(), paths.logs_dir()] {
                if dir.exists() {
                    if let Err(e) = std::fs::remove_dir_all(&dir) {
                        warn!("Failed to remove {}: {}", dir.display(), e);
                    }
                }
            }
        }
        Ok(report)
    }

    /// Host notification: the site is up
    pub async fn on_site_started(&self, site: SiteInfo) -> Result<BulkReport> {
        let site_id = site.id.clone();
        self.register_site(site);
        self.start_autostart(&site_id).await
    }

    /// Host notification: the site is going down
    pub async fn on_site_stopping(&self, site_id: &str) -> Result<BulkReport> {
        self.stop_all(site_id).await
    }

    /// Host notification: the site is being deleted
    pub async fn on_site_deleting(&self, site_id: &str) -> Result<BulkReport> {
        let report = self.remove_all(site_id).await?;
        self.unregister_site(site_id);
        Ok(report)
    }

    /// Stop every running app of every site
    pub async fn shutdown(&self) -> BulkReport {
        self.health.stop_all();

        let keys = self.supervisor.running();
        let results = join_all(keys.iter().map(|key| async move {
            (key, self.stop(&key.site_id, &key.app_id).await)
        }))
        .await;

        let mut report = BulkReport::default();
        for (key, result) in results {
            match result {
                Ok(_) => report.succeeded.push(key.to_string()),
                Err(e) => report.failed.push(BulkFailure {
                    app_id: key.to_string(),
                    error: sanitize_error(&e.to_string()),
                }),
            }
        }

        // Whatever is still registered (busy apps) goes down without a transition
        for key in self.supervisor.running() {
            self.supervisor.terminate(&key).await;
        }

        info!(
            "Shutdown stopped {} apps ({} failed)",
            report.succeeded.len(),
            report.failed.len()
        );
        report
    }

    // ---- state machine internals; callers hold the app's flight slot ----

    async fn restart_locked(&self, key: &AppKey, app: App) -> Result<App> {
        match app.status {
            AppStatus::Running | AppStatus::Starting => {
                self.health.stop(key);
                self.set_status(key, AppStatus::Restarting).await?;
                let outcome = self.supervisor.terminate(key).await;
                debug!("{} terminated for restart: {:?}", key, outcome);
                self.store
                    .update_app(&key.site_id, &key.app_id, |app| {
                        app.pid = None;
                        app.started_at = None;
                    })
                    .await?;
            }
            AppStatus::Stopped | AppStatus::Error => {}
            status => {
                return Err(Error::InvalidTransition {
                    action: "restart",
                    status,
                })
            }
        }

        self.bring_up(key, false).await
    }

    /// Provision as needed and launch; any failure leaves the app in `error`
    async fn bring_up(&self, key: &AppKey, reprovision: bool) -> Result<App> {
        match self.provision_and_launch(key, reprovision).await {
            Ok(app) => Ok(self.with_logs(&key.site_id, app)),
            Err(e) => Err(self.fail(key, e).await),
        }
    }

    async fn provision_and_launch(&self, key: &AppKey, reprovision: bool) -> Result<App> {
        let app = self.require(key).await?;
        let dir = self.app_dir(key);
        let phases = self.pipeline.plan(&app, &dir, reprovision);

        if !phases.is_empty() {
            let log = self.supervisor.log_for(key)?;
            let env = env::provision_env(
                &app,
                env::inherited_env(&self.settings.inherit_env),
                self.node.bin_dir(&app.node_version),
            );

            let mut current = app.status;
            for phase in phases {
                if current != phase.status() {
                    self.set_status(key, phase.status()).await?;
                    current = phase.status();
                }
                self.pipeline
                    .run_phase(phase, &app, &dir, &env, &log, reprovision)
                    .await?;
            }
        }

        self.launch(key).await
    }

    async fn launch(&self, key: &AppKey) -> Result<App> {
        let app = self.set_status(key, AppStatus::Starting).await?;
        let dir = self.app_dir(key);

        let fresh_lease = self.ports.lease(&key.site_id, &key.app_id).is_none();
        let port = self.ports.allocate(&key.site_id, &key.app_id)?;

        let site = self.site_info(&key.site_id);
        let wordpress = if app.inject_wp_env {
            self.wordpress.variables(&site)
        } else {
            BTreeMap::new()
        };
        let env = env::compose(
            &app,
            &site,
            EnvInputs {
                port,
                inherited: env::inherited_env(&self.settings.inherit_env),
                node_bin: self.node.bin_dir(&app.node_version),
                wordpress,
            },
        );

        let pid = match self
            .supervisor
            .spawn(key, &app.start_command, &dir, &env)
            .await
        {
            Ok(pid) => pid,
            Err(e) => {
                if fresh_lease {
                    self.ports.release(&key.site_id, &key.app_id);
                }
                return Err(e);
            }
        };

        let persisted = self
            .store
            .update_app(&key.site_id, &key.app_id, |app| {
                app.status = AppStatus::Running;
                app.pid = Some(pid);
                app.port = Some(port);
                app.started_at = Some(Utc::now());
                app.last_error = None;
                app.clone()
            })
            .await;
        let app = match persisted {
            Ok(app) => app,
            Err(e) => {
                self.supervisor.terminate(key).await;
                if fresh_lease {
                    self.ports.release(&key.site_id, &key.app_id);
                }
                return Err(e);
            }
        };
        self.announce(key, AppStatus::Running);
        info!("{} running on port {} (pid {})", key, port, pid);

        if let Some(check) = app.health_check.clone().filter(|hc| hc.enabled) {
            self.health
                .start(key.clone(), check, port, self.supervisor.log_for(key)?);
        }

        // The process may have exited between the startup window and the write above
        if self.supervisor.pid(key) != Some(pid) && self.apply_exit(key, pid).await {
            return self.require(key).await;
        }

        Ok(app)
    }

    /// `stopping` -> terminate -> `stopped`, keeping the port lease
    async fn halt(&self, key: &AppKey) -> Result<()> {
        self.health.stop(key);
        self.set_status(key, AppStatus::Stopping).await?;

        if self.supervisor.terminate(key).await == Termination::Unresponsive {
            error!("{} could not be killed; releasing it anyway", key);
        }

        self.store
            .update_app(&key.site_id, &key.app_id, |app| {
                app.status = AppStatus::Stopped;
                app.pid = None;
                app.started_at = None;
            })
            .await?;
        self.announce(key, AppStatus::Stopped);
        Ok(())
    }

    /// Record a failure: full error to the daemon log, sanitized message on
    /// the app. Returns the error for propagation.
    async fn fail(&self, key: &AppKey, err: Error) -> Error {
        error!("{} failed: {}", key, err);
        let message = sanitize_error(&err.to_string());

        if let Ok(log) = self.supervisor.log_for(key) {
            log.system(&format!("error: {}", message));
        }

        let result = self
            .store
            .update_app(&key.site_id, &key.app_id, move |app| {
                app.status = AppStatus::Error;
                app.pid = None;
                app.started_at = None;
                app.last_error = Some(message);
            })
            .await;
        match result {
            Ok(()) => self.announce(key, AppStatus::Error),
            Err(e) => warn!("Failed to record error state of {}: {}", key, e),
        }
        err
    }

    async fn set_status(&self, key: &AppKey, status: AppStatus) -> Result<App> {
        let app = self
            .store
            .update_app(&key.site_id, &key.app_id, |app| {
                app.status = status;
                app.clone()
            })
            .await?;
        self.announce(key, status);
        Ok(app)
    }

    fn announce(&self, key: &AppKey, status: AppStatus) {
        debug!("{} -> {}", key, status);
        let _ = self.changes.send(StatusChange {
            key: key.clone(),
            status,
        });
    }

    // ---- events ----

    async fn handle_exit(&self, exit: ProcessExit) {
        info!(
            "{} (pid {}) exited with code {:?} signal {:?}",
            exit.key, exit.pid, exit.code, exit.signal
        );
        self.apply_exit(&exit.key, exit.pid).await;
    }

    /// A process ending by itself while `running` is a stop, not an error.
    /// Returns whether the app was moved to `stopped`.
    async fn apply_exit(&self, key: &AppKey, pid: u32) -> bool {
        let result = self
            .store
            .update(&key.site_id, |apps| {
                let Some(app) = apps.get_mut(&key.app_id) else {
                    return Ok(false);
                };
                if app.status != AppStatus::Running || app.pid != Some(pid) {
                    return Ok(false);
                }
                app.status = AppStatus::Stopped;
                app.pid = None;
                app.started_at = None;
                app.touch();
                Ok(true)
            })
            .await;

        match result {
            Ok(true) => {
                self.health.stop(key);
                self.announce(key, AppStatus::Stopped);
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("Failed to record exit of {}: {}", key, e);
                false
            }
        }
    }

    fn handle_health_signal(self: &Arc<Self>, signal: HealthSignal) {
        warn!(
            "{} failed {} consecutive health checks at {}",
            signal.key, signal.consecutive_failures, signal.url
        );
        if !self.settings.restart_on_health_failure {
            return;
        }

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let key = signal.key;
            match controller.restart(&key.site_id, &key.app_id).await {
                Ok(_) => info!("Restarted {} after failed health checks", key),
                Err(e) if e.is_busy() => debug!("{} busy, skipping health restart", key),
                Err(e) => warn!("Health restart of {} failed: {}", key, e),
            }
        });
    }

    // ---- helpers ----

    async fn require(&self, key: &AppKey) -> Result<App> {
        self.store
            .get(&key.site_id, &key.app_id)
            .await?
            .ok_or_else(|| Error::AppNotFound(key.app_id.clone()))
    }

    fn app_dir(&self, key: &AppKey) -> PathBuf {
        self.settings.site_paths(&key.site_id).app_dir(&key.app_id)
    }

    fn with_logs(&self, site_id: &str, mut app: App) -> App {
        app.logs = self
            .supervisor
            .recent_logs(&AppKey::new(site_id, &app.id), APP_LOG_PREVIEW_LINES)
            .unwrap_or_default();
        app
    }

    fn purge_files(&self, key: &AppKey) {
        let dir = self.app_dir(key);
        if dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!("Failed to remove {}: {}", dir.display(), e);
            }
        }

        self.supervisor.forget_logs(key);
        let log = self.supervisor.log_path(&key.site_id, &key.app_id);
        RotationConfig::from_settings(&self.settings).remove_all(&log);
    }
}

/// Run `op` for every id concurrently and collect per-app outcomes
async fn fan_out<F, Fut>(ids: Vec<String>, op: F) -> BulkReport
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let results = join_all(ids.into_iter().map(|id| {
        let fut = op(id.clone());
        async move { (id, fut.await) }
    }))
    .await;

    let mut report = BulkReport::default();
    for (id, result) in results {
        match result {
            Ok(()) => report.succeeded.push(id),
            Err(e) => {
                warn!("Bulk operation failed for {}: {}", id, e);
                report.failed.push(BulkFailure {
                    app_id: id,
                    error: sanitize_error(&e.to_string()),
                });
            }
        }
    }
    report
}
