//! Atomic record writes: temp file in the target directory, fsync, rename

use serde_json::to_vec_pretty;
use sitepm_core::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub(crate) fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::store(format!("No parent directory for {}", path.display())))?;
    fs::create_dir_all(parent)?;

    let bytes = to_vec_pretty(value)?;

    // Same directory as the target so the rename never crosses filesystems
    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(&bytes)?;
    temp.as_file().sync_all()?;

    temp.persist(path)
        .map_err(|e| Error::store(format!("Failed to replace {}: {}", path.display(), e.error)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_replaces_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("record.json");

        write_json(&path, &vec!["a", "b", "c"]).unwrap();
        write_json(&path, &vec!["d"]).unwrap();

        let content: Vec<String> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(content, vec!["d".to_string()]);

        // No temp files left behind
        let entries = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
