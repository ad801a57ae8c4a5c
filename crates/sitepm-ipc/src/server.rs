//! Unix socket server of the daemon

use sitepm_core::{sanitize_error, Error, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use crate::protocol::{Request, Response};

/// Longest request line accepted; larger requests close the connection
pub const MAX_REQUEST_BYTES: u64 = 1024 * 1024;

pub struct IpcServer {
    socket_path: PathBuf,
    listener: UnixListener,
}

impl IpcServer {
    /// Bind to a Unix socket, replacing a stale socket file
    pub async fn bind(socket_path: &Path) -> Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(socket_path)
            .map_err(|e| Error::ipc(format!("Failed to bind socket: {}", e)))?;

        // Owner-only
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| Error::ipc(format!("Failed to set socket permissions: {}", e)))?;
        }

        info!("IPC server listening on {}", socket_path.display());

        Ok(Self {
            socket_path: socket_path.to_path_buf(),
            listener,
        })
    }

    pub async fn accept(&self) -> Result<IpcConnection> {
        let (stream, _) = self
            .listener
            .accept()
            .await
            .map_err(|e| Error::ipc(format!("Accept failed: {}", e)))?;

        debug!("Accepted IPC connection");
        Ok(IpcConnection::new(stream))
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                error!("Failed to remove socket file: {}", e);
            }
        }
    }
}

/// One line read off a connection
#[derive(Debug)]
pub enum Incoming {
    Request(Request),
    /// Not a request; answered with an error, the connection stays open
    Malformed(String),
    /// Longer than [`MAX_REQUEST_BYTES`]
    Oversized,
}

/// A client connection. Requests are newline-delimited; several may be
/// queued in one write.
pub struct IpcConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl IpcConnection {
    pub fn new(stream: UnixStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer: write,
        }
    }

    /// Next line from the peer; `None` once it closed the connection
    pub async fn read_request(&mut self) -> Result<Option<Incoming>> {
        let mut buf = Vec::new();
        let read = (&mut self.reader)
            .take(MAX_REQUEST_BYTES + 1)
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| Error::ipc(format!("Read error: {}", e)))?;

        if read == 0 {
            return Ok(None);
        }
        if buf.len() as u64 > MAX_REQUEST_BYTES {
            return Ok(Some(Incoming::Oversized));
        }

        match serde_json::from_slice::<Request>(&buf) {
            Ok(request) => {
                debug!("Received request: {:?}", request);
                Ok(Some(Incoming::Request(request)))
            }
            Err(e) => Ok(Some(Incoming::Malformed(sanitize_error(&format!(
                "Invalid request: {}",
                e
            ))))),
        }
    }

    pub async fn send_response(&mut self, response: &Response) -> Result<()> {
        let mut json = serde_json::to_string(response)?;
        json.push('\n');

        self.writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| Error::ipc(format!("Write error: {}", e)))?;

        self.writer
            .flush()
            .await
            .map_err(|e| Error::ipc(format!("Flush error: {}", e)))?;

        debug!("Sent response: {:?}", response);
        Ok(())
    }

    /// Answer requests with `handle` until the peer hangs up
    pub async fn serve<F, Fut>(mut self, handle: F)
    where
        F: Fn(Request) -> Fut,
        Fut: Future<Output = Response>,
    {
        loop {
            let response = match self.read_request().await {
                Ok(Some(Incoming::Request(request))) => handle(request).await,
                Ok(Some(Incoming::Malformed(message))) => {
                    warn!("{}", message);
                    Response::error(message)
                }
                Ok(Some(Incoming::Oversized)) => {
                    warn!("Closing connection after an oversized request");
                    let response = Response::error(format!(
                        "Request exceeds {} bytes",
                        MAX_REQUEST_BYTES
                    ));
                    if let Err(e) = self.send_response(&response).await {
                        debug!("Peer gone before the size error was sent: {}", e);
                    }
                    break;
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Error reading request: {}", e);
                    break;
                }
            };

            if let Err(e) = self.send_response(&response).await {
                error!("Failed to send response: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::IpcClient;
    use tempfile::tempdir;

    async fn serve_pings(socket_path: &Path) -> tokio::task::JoinHandle<()> {
        let server = IpcServer::bind(socket_path).await.unwrap();
        tokio::spawn(async move {
            let conn = server.accept().await.unwrap();
            conn.serve(|request| async move {
                match request {
                    Request::Ping => Response::Pong,
                    _ => Response::error("unexpected request"),
                }
            })
            .await;
        })
    }

    async fn read_responses(stream: UnixStream) -> Vec<Response> {
        let mut lines = BufReader::new(stream).lines();
        let mut responses = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            responses.push(serde_json::from_str(&line).unwrap());
        }
        responses
    }

    #[tokio::test]
    async fn test_server_bind() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let server = IpcServer::bind(&socket_path).await.unwrap();
        assert!(socket_path.exists());

        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&socket_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        drop(server);
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_stale_socket_replaced() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        std::fs::write(&socket_path, "stale").unwrap();

        let _server = IpcServer::bind(&socket_path).await.unwrap();
        assert!(std::fs::metadata(&socket_path).unwrap().len() == 0);
    }

    #[tokio::test]
    async fn test_ping_through_client() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let _task = serve_pings(&socket_path).await;

        let client = IpcClient::new(socket_path).without_autostart();
        assert!(client.ping().await.unwrap());
    }

    #[tokio::test]
    async fn test_queued_and_malformed_requests() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let task = serve_pings(&socket_path).await;

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        stream
            .write_all(b"{\"type\":\"ping\"}\nnot json\n{\"type\":\"ping\"}\n")
            .await
            .unwrap();
        stream.shutdown().await.unwrap();

        let responses = read_responses(stream).await;
        task.await.unwrap();

        assert_eq!(responses.len(), 3);
        assert!(matches!(responses[0], Response::Pong));
        assert!(responses[1]
            .error_message()
            .unwrap()
            .starts_with("Invalid request"));
        assert!(matches!(responses[2], Response::Pong));
    }

    #[tokio::test]
    async fn test_oversized_request_closes_connection() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let task = serve_pings(&socket_path).await;

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        let mut payload = vec![b'x'; MAX_REQUEST_BYTES as usize + 16];
        payload.extend_from_slice(b"\n{\"type\":\"ping\"}\n");
        // The server may hang up before reading everything
        let _ = stream.write_all(&payload).await;
        let _ = stream.shutdown().await;

        let responses = read_responses(stream).await;
        task.await.unwrap();

        assert_eq!(responses.len(), 1);
        assert!(responses[0].error_message().unwrap().contains("exceeds"));
    }
}
