//! Main daemon orchestration

use sitepm_core::{Result, Settings};
use sitepm_ipc::IpcServer;
use sitepm_lifecycle::{Collaborators, LifecycleController};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::handlers::RequestHandler;

/// Main daemon struct
pub struct Daemon {
    server: IpcServer,
    controller: Arc<LifecycleController>,
    handler: Arc<RequestHandler>,
}

impl Daemon {
    /// Reconcile persisted state and bind the socket
    pub async fn new(settings: Settings, socket_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(&settings.home)?;
        info!("Using home {}", settings.home.display());

        let collaborators = Collaborators::from_settings(&settings);
        let controller = LifecycleController::new(settings, collaborators);
        let changed = controller.reconcile().await?;
        if changed > 0 {
            info!("Reconciled {} apps left over from the previous run", changed);
        }

        let server = IpcServer::bind(socket_path).await?;
        let handler = Arc::new(RequestHandler::new(Arc::clone(&controller)));

        Ok(Self {
            server,
            controller,
            handler,
        })
    }

    /// Serve connections until the task is dropped
    pub async fn run(&self) -> Result<()> {
        info!("Daemon running, waiting for connections...");

        loop {
            match self.server.accept().await {
                Ok(conn) => {
                    let handler = Arc::clone(&self.handler);
                    tokio::spawn(conn.serve(move |request| {
                        let handler = Arc::clone(&handler);
                        async move { handler.handle(request).await }
                    }));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    /// Stop every running app
    pub async fn shutdown(&self) {
        let report = self.controller.shutdown().await;
        for failure in &report.failed {
            warn!("{} did not stop cleanly: {}", failure.app_id, failure.error);
        }
    }
}
