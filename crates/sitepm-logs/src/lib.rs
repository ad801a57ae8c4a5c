//! sitepm Logs - Per-app log files, rotation and in-memory tails

mod buffer;
mod reader;
mod rotation;
mod writer;

pub use buffer::LogBuffer;
pub use reader::LogReader;
pub use rotation::RotationConfig;
pub use writer::{format_line, LogStream, LogWriter};

use parking_lot::Mutex;
use sitepm_core::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::warn;

/// Log sink of one app: the rotated file plus the recent-lines buffer.
///
/// Shared between the capture tasks, the provisioning phases and the
/// supervisor; every line goes to both destinations.
pub struct AppLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
    buffer: Mutex<LogBuffer>,
}

impl AppLog {
    pub fn open(path: PathBuf, rotation: RotationConfig, buffer_lines: usize) -> Result<Self> {
        let writer = LogWriter::new(path.clone(), rotation)?;
        Ok(Self {
            path,
            writer: Mutex::new(writer),
            buffer: Mutex::new(LogBuffer::new(buffer_lines)),
        })
    }

    pub fn append(&self, stream: LogStream, line: &str) {
        let formatted = format_line(stream, line);
        if let Err(e) = self.writer.lock().write_formatted(&formatted) {
            // The buffer still gets the line
            warn!("Failed to write {}: {}", self.path.display(), e);
        }
        self.buffer.lock().push(stream, formatted);
    }

    pub fn system(&self, line: &str) {
        self.append(LogStream::System, line);
    }

    pub fn recent(&self, limit: usize) -> Vec<String> {
        self.buffer.lock().recent(limit)
    }

    /// Recent stderr output, used to explain a failed start
    pub fn recent_stderr(&self, limit: usize) -> Vec<String> {
        self.buffer.lock().recent_from(LogStream::Stderr, limit)
    }
}

/// Line-by-line capture of child output into an [`AppLog`]
pub struct LogCapture;

impl LogCapture {
    /// Spawn one task per pipe; each ends at EOF
    pub fn spawn_capture<O, E>(
        log: Arc<AppLog>,
        stdout: Option<O>,
        stderr: Option<E>,
    ) -> Vec<JoinHandle<()>>
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let mut handles = Vec::with_capacity(2);

        if let Some(out) = stdout {
            handles.push(spawn_pipe(Arc::clone(&log), out, LogStream::Stdout));
        }
        if let Some(err) = stderr {
            handles.push(spawn_pipe(log, err, LogStream::Stderr));
        }

        handles
    }
}

fn spawn_pipe<R>(log: Arc<AppLog>, pipe: R, stream: LogStream) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();

        // Keep draining to EOF; a closed pipe would SIGPIPE the child
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = buf.strip_suffix(b"\n").unwrap_or(&buf);
                    let line = line.strip_suffix(b"\r").unwrap_or(line);
                    log.append(stream, &String::from_utf8_lossy(line));
                }
                Err(e) => {
                    warn!("Stopped reading {} of {}: {}", stream, log.path.display(), e);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_reaches_file_and_buffer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("app.log");
        let log = AppLog::open(path.clone(), RotationConfig::default(), 2).unwrap();

        log.append(LogStream::Stdout, "one");
        log.append(LogStream::Stderr, "two");
        log.system("three");

        let recent = log.recent(10);
        assert_eq!(recent.len(), 2);
        assert!(recent[0].ends_with("[stderr] two"));
        assert!(recent[1].ends_with("[system] three"));

        let file = LogReader::new(path, RotationConfig::default()).tail(10).unwrap();
        assert_eq!(file.len(), 3);
        assert!(file[0].ends_with("[stdout] one"));
    }

    #[tokio::test]
    async fn test_capture_child_output() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(
            AppLog::open(dir.path().join("app.log"), RotationConfig::default(), 100).unwrap(),
        );

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg("echo hello; echo oops >&2")
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .unwrap();

        let handles =
            LogCapture::spawn_capture(Arc::clone(&log), child.stdout.take(), child.stderr.take());
        child.wait().await.unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        let recent = log.recent(10);
        assert!(recent.iter().any(|l| l.ends_with("[stdout] hello")));
        assert_eq!(log.recent_stderr(10).len(), 1);
    }

    #[tokio::test]
    async fn test_capture_survives_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(
            AppLog::open(dir.path().join("app.log"), RotationConfig::default(), 100).unwrap(),
        );

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg("printf 'before\\n\\377bad\\r\\nafter\\n'; sleep 0.2; echo late; echo done")
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .unwrap();

        let handles =
            LogCapture::spawn_capture(Arc::clone(&log), child.stdout.take(), child.stderr.take());
        let status = child.wait().await.unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(status.success());
        let lines: Vec<String> = log
            .recent(10)
            .iter()
            .map(|l| l.splitn(3, "] ").nth(2).unwrap().to_string())
            .collect();
        assert_eq!(lines, vec!["before", "\u{fffd}bad", "after", "late", "done"]);
    }
}
