//! IPC Client - Unix socket client for the CLI and host integrations

use sitepm_core::{Error, Result};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, info, warn};

use crate::protocol::{Request, Response};

/// Name of the daemon executable
const DAEMON_BIN: &str = "sitepmd";

/// IPC Client for communication with the daemon
pub struct IpcClient {
    socket_path: PathBuf,
    autostart: bool,
}

impl IpcClient {
    /// Client that starts the daemon when it is not running
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            autostart: true,
        }
    }

    /// Never spawn the daemon; fail with `DaemonNotRunning` instead
    pub fn without_autostart(mut self) -> Self {
        self.autostart = false;
        self
    }

    /// Connect to daemon (without auto-start)
    pub async fn connect(&self) -> Result<UnixStream> {
        if !self.socket_path.exists() {
            return Err(Error::DaemonNotRunning);
        }

        UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
                    Error::DaemonNotRunning
                }
                _ => Error::IpcConnectionFailed(e.to_string()),
            })
    }

    /// Connect to daemon, starting it if necessary
    pub async fn connect_or_start(&self) -> Result<UnixStream> {
        match self.connect().await {
            Ok(stream) => Ok(stream),
            Err(Error::DaemonNotRunning) if self.autostart => {
                info!("Daemon not running, starting...");
                self.start_daemon()?;

                for i in 0..50 {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    if let Ok(stream) = self.connect().await {
                        info!("Connected to daemon after {}ms", (i + 1) * 100);
                        return Ok(stream);
                    }
                }

                Err(Error::ipc("Daemon failed to start within timeout"))
            }
            Err(e) => Err(e),
        }
    }

    fn start_daemon(&self) -> Result<()> {
        // Next to the CLI binary, else PATH
        let exe = std::env::current_exe()?;
        let exe_dir = exe
            .parent()
            .ok_or_else(|| Error::ipc("Cannot determine executable directory"))?;

        let daemon_path = exe_dir.join(DAEMON_BIN);
        let daemon_exe = if daemon_path.exists() {
            daemon_path
        } else {
            warn!("{} not found at {}, trying PATH", DAEMON_BIN, daemon_path.display());
            PathBuf::from(DAEMON_BIN)
        };

        info!("Starting daemon: {}", daemon_exe.display());

        Command::new(&daemon_exe)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| Error::ipc(format!("Failed to start daemon: {}", e)))?;

        Ok(())
    }

    /// Send a request and receive its response
    pub async fn send(&self, request: &Request) -> Result<Response> {
        let mut stream = self.connect_or_start().await?;

        let mut json = serde_json::to_string(request)?;
        json.push('\n');

        stream
            .write_all(json.as_bytes())
            .await
            .map_err(|e| Error::ipc(format!("Write error: {}", e)))?;

        stream
            .flush()
            .await
            .map_err(|e| Error::ipc(format!("Flush error: {}", e)))?;

        debug!("Sent request: {:?}", request);

        let mut reader = BufReader::new(stream);
        let mut line = String::new();

        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| Error::ipc(format!("Read error: {}", e)))?;
        if read == 0 {
            return Err(Error::ipc("Daemon closed the connection"));
        }

        let response: Response = serde_json::from_str(line.trim())
            .map_err(|e| Error::ipc(format!("Invalid response: {}", e)))?;

        debug!("Received response: {:?}", response);
        Ok(response)
    }

    pub async fn ping(&self) -> Result<bool> {
        match self.send(&Request::Ping).await {
            Ok(Response::Pong) => Ok(true),
            Ok(_) => Ok(false),
            Err(Error::DaemonNotRunning) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_client_creation() {
        let client = IpcClient::new(PathBuf::from("/tmp/test.sock"));
        assert_eq!(client.socket_path, PathBuf::from("/tmp/test.sock"));
        assert!(client.autostart);
        assert!(!client.without_autostart().autostart);
    }

    #[tokio::test]
    async fn test_connect_no_daemon() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("nonexistent.sock");

        let client = IpcClient::new(socket_path).without_autostart();
        assert!(matches!(client.connect().await, Err(Error::DaemonNotRunning)));
        assert!(!client.ping().await.unwrap());
    }
}
