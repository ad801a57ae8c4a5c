//! Log writer with rotation support

use chrono::Utc;
use sitepm_core::Result;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::rotation::RotationConfig;

/// Origin of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
    /// Notes written by the supervisor itself (exits, termination, phases)
    System,
}

impl LogStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStream::Stdout => "stdout",
            LogStream::Stderr => "stderr",
            LogStream::System => "system",
        }
    }
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render a line the way it lands in the log file (without newline)
pub fn format_line(stream: LogStream, line: &str) -> String {
    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
    format!("[{}] [{}] {}", timestamp, stream, line)
}

/// Append-only log file writer that handles rotation
pub struct LogWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    config: RotationConfig,
    current_size: u64,
}

impl LogWriter {
    /// Create a new log writer
    pub fn new(path: PathBuf, config: RotationConfig) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let current_size = file.metadata()?.len();
        let writer = BufWriter::new(file);

        Ok(Self {
            path,
            writer,
            config,
            current_size,
        })
    }

    /// Write an already formatted line
    pub fn write_formatted(&mut self, formatted: &str) -> Result<()> {
        self.writer.write_all(formatted.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.current_size += formatted.len() as u64 + 1;

        // Check if rotation is needed
        if self.current_size >= self.config.max_size_bytes {
            self.rotate()?;
        }

        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.config.shift(&self.path)?;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;

        self.writer = BufWriter::new(file);
        self.current_size = 0;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_log_writer_creation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("test.log");

        let writer = LogWriter::new(path.clone(), RotationConfig::default());
        assert!(writer.is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_lines_are_tagged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.log");

        let mut writer = LogWriter::new(path.clone(), RotationConfig::default()).unwrap();
        writer.write_formatted(&format_line(LogStream::Stdout, "listening on 3001")).unwrap();
        writer.write_formatted(&format_line(LogStream::Stderr, "deprecated API")).unwrap();
        writer.write_formatted(&format_line(LogStream::System, "exited with code 0")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("[20"));
        assert!(lines[0].ends_with("] [stdout] listening on 3001"));
        assert!(lines[1].ends_with("] [stderr] deprecated API"));
        assert!(lines[2].ends_with("] [system] exited with code 0"));
    }

    #[test]
    fn test_log_rotation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.log");

        // Small rotation size for testing
        let config = RotationConfig::new(100, 3);
        let mut writer = LogWriter::new(path.clone(), config).unwrap();

        for i in 0..20 {
            writer
                .write_formatted(&format_line(
                    LogStream::Stdout,
                    &format!("Line {} with some content", i),
                ))
                .unwrap();
        }

        assert!(path.exists());
        assert!(dir.path().join("test.log.1").exists());
        assert!(dir.path().join("test.log.2").exists());
        assert!(!dir.path().join("test.log.3").exists());
    }

}
