//! Size-based rotation of an app's log into numbered siblings
//!
//! `app.log` is the live file; `app.log.1` is the most recent rotated file
//! and `app.log.{max_files - 1}` the oldest one kept.

use sitepm_core::{constants, Result, Settings};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// Live file size that triggers a rotation
    pub max_size_bytes: u64,
    /// Files kept in total, the live one included
    pub max_files: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self::new(
            constants::DEFAULT_LOG_MAX_SIZE,
            constants::DEFAULT_LOG_MAX_FILES,
        )
    }
}

impl RotationConfig {
    pub fn new(max_size_bytes: u64, max_files: usize) -> Self {
        Self {
            max_size_bytes,
            max_files,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.log_max_size_bytes, settings.log_max_files)
    }

    /// Live file first, then rotated files from newest to oldest
    pub fn files(&self, base: &Path) -> Vec<PathBuf> {
        std::iter::once(base.to_path_buf())
            .chain((1..self.max_files).map(|i| rotated_path(base, i)))
            .collect()
    }

    /// Shift `base` into `.1`, `.1` into `.2` and so on, dropping the oldest.
    /// The caller reopens `base` afterwards.
    pub fn shift(&self, base: &Path) -> Result<()> {
        debug!("Rotating {}", base.display());

        if self.max_files <= 1 {
            return Ok(());
        }

        let oldest = rotated_path(base, self.max_files - 1);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for i in (1..self.max_files - 1).rev() {
            let from = rotated_path(base, i);
            if from.exists() {
                fs::rename(&from, rotated_path(base, i + 1))?;
            }
        }
        if base.exists() {
            fs::rename(base, rotated_path(base, 1))?;
        }
        Ok(())
    }

    /// Delete the live file and every rotated sibling
    pub fn remove_all(&self, base: &Path) {
        for path in self.files(base) {
            if !path.exists() {
                continue;
            }
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}

/// `app.log` -> `app.log.{index}`
pub(crate) fn rotated_path(base: &Path, index: usize) -> PathBuf {
    let name = base
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    base.with_file_name(format!("{}.{}", name, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rotated_path() {
        let base = PathBuf::from("/srv/sites/blog/logs/abc.log");
        assert_eq!(
            rotated_path(&base, 2),
            PathBuf::from("/srv/sites/blog/logs/abc.log.2")
        );
    }

    #[test]
    fn test_shift_keeps_max_files() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("abc.log");
        let config = RotationConfig::new(100, 3);

        for generation in ["first", "second", "third", "fourth"] {
            fs::write(&base, generation).unwrap();
            config.shift(&base).unwrap();
        }

        assert!(!base.exists());
        assert_eq!(fs::read_to_string(rotated_path(&base, 1)).unwrap(), "fourth");
        assert_eq!(fs::read_to_string(rotated_path(&base, 2)).unwrap(), "third");
        assert!(!rotated_path(&base, 3).exists());
    }

    #[test]
    fn test_remove_all() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("abc.log");
        let config = RotationConfig::new(100, 3);
        fs::write(&base, "live").unwrap();
        fs::write(rotated_path(&base, 1), "old").unwrap();

        config.remove_all(&base);

        assert!(config.files(&base).iter().all(|p| !p.exists()));
    }
}
