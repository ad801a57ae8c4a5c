//! Collaborators the orchestrator depends on but does not implement

use async_trait::async_trait;
use sitepm_core::{Result, SiteInfo};
use sitepm_logs::AppLog;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Fetches app sources into a directory
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Clone `branch` of `url` into `dest`. `dest` does not exist or is empty.
    ///
    /// Dropping the returned future must abort the clone; the caller uses
    /// this to enforce its timeout.
    async fn clone_repo(&self, url: &str, branch: &str, dest: &Path, log: &AppLog) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Resolves a Node.js version spec to a directory holding its binaries
pub trait NodeLocator: Send + Sync {
    fn bin_dir(&self, version: &str) -> Option<PathBuf>;
}

/// Uses whatever `node` the inherited `PATH` provides
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNode;

impl NodeLocator for SystemNode {
    fn bin_dir(&self, _version: &str) -> Option<PathBuf> {
        None
    }
}

/// Node versions installed side by side as `{root}/{version}/bin`
#[derive(Debug, Clone)]
pub struct VersionDirNode {
    root: PathBuf,
}

impl VersionDirNode {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl NodeLocator for VersionDirNode {
    fn bin_dir(&self, version: &str) -> Option<PathBuf> {
        let dir = self.root.join(version).join("bin");
        dir.is_dir().then_some(dir)
    }
}

/// Translates the owning site's WordPress metadata into variables
pub trait WordPressEnv: Send + Sync {
    fn variables(&self, site: &SiteInfo) -> BTreeMap<String, String>;
}

/// Hosts without WordPress integration
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWordPress;

impl WordPressEnv for NoWordPress {
    fn variables(&self, _site: &SiteInfo) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}
