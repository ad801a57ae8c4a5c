//! Reading the end of an app's log from disk

use sitepm_core::Result;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::rotation::RotationConfig;

const CHUNK_SIZE: u64 = 8192;

/// Tails an app log, continuing into rotated files when the live file
/// holds fewer lines than asked for
pub struct LogReader {
    base: PathBuf,
    rotation: RotationConfig,
}

impl LogReader {
    pub fn new(base: PathBuf, rotation: RotationConfig) -> Self {
        Self { base, rotation }
    }

    /// Last `limit` lines, oldest first
    pub fn tail(&self, limit: usize) -> Result<Vec<String>> {
        let mut remaining = limit;
        let mut segments = Vec::new();

        for path in self.rotation.files(&self.base) {
            if remaining == 0 {
                break;
            }
            if !path.exists() {
                continue;
            }
            let lines = tail_file(&path, remaining)?;
            remaining -= lines.len();
            segments.push(lines);
        }

        // Segments run newest file first
        Ok(segments.into_iter().rev().flatten().collect())
    }
}

/// Last `limit` lines of one file, read backwards in chunks
fn tail_file(path: &Path, limit: usize) -> Result<Vec<String>> {
    let mut file = File::open(path)?;
    let mut position = file.metadata()?.len();

    // Newest first until the final reverse
    let mut lines: Vec<String> = Vec::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut seen_newline = false;

    while position > 0 && lines.len() < limit {
        let read = CHUNK_SIZE.min(position);
        position -= read;
        file.seek(SeekFrom::Start(position))?;

        let mut chunk = vec![0u8; read as usize];
        file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&pending);
        pending = chunk;

        while let Some(idx) = pending.iter().rposition(|&b| b == b'\n') {
            let line = pending.split_off(idx + 1);
            pending.truncate(idx);
            let trailing = !seen_newline && line.is_empty();
            seen_newline = true;
            if trailing {
                continue;
            }
            if lines.len() == limit {
                break;
            }
            lines.push(decode(&line));
        }
    }

    if position == 0 && lines.len() < limit && (seen_newline || !pending.is_empty()) {
        lines.push(decode(&pending));
    }

    lines.reverse();
    Ok(lines)
}

fn decode(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
