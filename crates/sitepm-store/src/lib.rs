//! sitepm Store - Durable per-site app collections
//!
//! Each site owns one JSON record (`sites/{site}/apps.json`). Every write
//! replaces the whole record atomically and writes to one site are serialized
//! behind that site's async lock, so concurrent status updates for different
//! apps of the same site never lose each other.

mod atomic;

use sitepm_core::{validate_site_id, App, Error, Result, SiteApps, SitePaths};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Cached collection of one site; `None` until first read from disk
type SiteSlot = Arc<Mutex<Option<SiteApps>>>;

/// Config store for all sites below a home directory
pub struct ConfigStore {
    home: PathBuf,
    sites: parking_lot::Mutex<HashMap<String, SiteSlot>>,
}

impl ConfigStore {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            sites: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, site_id: &str) -> Result<SiteSlot> {
        if !validate_site_id(site_id) {
            return Err(Error::validation(format!("Invalid site id '{}'", site_id)));
        }
        let mut sites = self.sites.lock();
        Ok(Arc::clone(
            sites
                .entry(site_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(None))),
        ))
    }

    fn record_path(&self, site_id: &str) -> PathBuf {
        SitePaths::new(&self.home, site_id).apps_file()
    }

    /// Load the collection of a site; empty if nothing was persisted yet
    pub async fn load(&self, site_id: &str) -> Result<SiteApps> {
        let slot = self.slot(site_id)?;
        let mut cached = slot.lock().await;
        Ok(self.ensure_loaded(site_id, &mut *cached)?.clone())
    }

    fn ensure_loaded<'a>(
        &self,
        site_id: &str,
        cached: &'a mut Option<SiteApps>,
    ) -> Result<&'a mut SiteApps> {
        if cached.is_none() {
            *cached = Some(read_record(&self.record_path(site_id))?);
        }
        cached
            .as_mut()
            .ok_or_else(|| Error::store("site record unavailable"))
    }

    /// Replace the whole collection of a site
    pub async fn save(&self, site_id: &str, apps: &SiteApps) -> Result<()> {
        let slot = self.slot(site_id)?;
        let mut cached = slot.lock().await;
        atomic::write_json(&self.record_path(site_id), apps)?;
        *cached = Some(apps.clone());
        Ok(())
    }

    /// Load, mutate and save a site's collection under its write lock.
    /// Nothing is written when `f` fails.
    pub async fn update<T, F>(&self, site_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut SiteApps) -> Result<T>,
    {
        let slot = self.slot(site_id)?;
        let mut cached = slot.lock().await;
        let mut next = self.ensure_loaded(site_id, &mut *cached)?.clone();

        let out = f(&mut next)?;

        atomic::write_json(&self.record_path(site_id), &next)?;
        *cached = Some(next);
        Ok(out)
    }

    /// Mutate a single app and persist; bumps `updated_at`
    pub async fn update_app<T, F>(&self, site_id: &str, app_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut App) -> T,
    {
        self.update(site_id, |apps| {
            let app = apps
                .get_mut(app_id)
                .ok_or_else(|| Error::AppNotFound(app_id.to_string()))?;
            let out = f(app);
            app.touch();
            Ok(out)
        })
        .await
    }

    pub async fn get(&self, site_id: &str, app_id: &str) -> Result<Option<App>> {
        Ok(self.load(site_id).await?.get(app_id).cloned())
    }

    pub async fn upsert(&self, site_id: &str, app: App) -> Result<()> {
        self.update(site_id, |apps| {
            apps.upsert(app);
            Ok(())
        })
        .await
    }

    pub async fn remove(&self, site_id: &str, app_id: &str) -> Result<Option<App>> {
        self.update(site_id, |apps| Ok(apps.remove(app_id))).await
    }

    /// Drop a site's record entirely
    pub async fn purge(&self, site_id: &str) -> Result<()> {
        let slot = self.slot(site_id)?;
        let mut cached = slot.lock().await;
        let path = self.record_path(site_id);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        *cached = Some(SiteApps::default());
        info!("Purged app record for site {}", site_id);
        Ok(())
    }

    /// Sites that have a persisted record
    pub fn list_sites(&self) -> Result<Vec<String>> {
        let dir = self.home.join(sitepm_core::constants::SITES_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut sites = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if validate_site_id(&name) && self.record_path(&name).exists() {
                sites.push(name);
            }
        }
        sites.sort();
        Ok(sites)
    }
}

fn read_record(path: &Path) -> Result<SiteApps> {
    if !path.exists() {
        debug!("No app record at {}, starting empty", path.display());
        return Ok(SiteApps::default());
    }

    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str(&content) {
        Ok(apps) => Ok(apps),
        Err(e) => {
            // Keep the unreadable record for inspection instead of overwriting it
            let backup = path.with_extension(format!(
                "json.corrupt-{}",
                chrono::Utc::now().format("%Y%m%d%H%M%S")
            ));
            warn!(
                "App record {} is unreadable ({}), moved to {}",
                path.display(),
                e,
                backup.display()
            );
            std::fs::rename(path, &backup)?;
            Ok(SiteApps::default())
        }
    }
}
