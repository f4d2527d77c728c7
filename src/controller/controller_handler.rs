use log::{error, info, warn};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::configuration::Config;
use crate::error_handling::types::*;
use crate::session_management::session_manager::{ManagerSettings, SessionManager};
use crate::storage::{ArtifactGateway, ArtifactStorage, FileStorage, Janitor};
use crate::transcoder_management::FfmpegLauncher;
use crate::web_interface::{ConnectionHub, WebServer};

/// Owns the configuration and the artifact store, and runs the service.
pub struct Controller {
    pub config: Config,
    storage: Arc<FileStorage>,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        config.validate()?;
        config.ensure_output_dir()?;
        let storage = FileStorage::new(&config.storage.output_dir)?;
        Ok(Self {
            config,
            storage: Arc::new(storage),
        })
    }

    /// Serves until Ctrl-C (or SIGTERM on unix).
    pub async fn run(&mut self) -> Result<(), ControllerError> {
        self.run_until(shutdown_signal()).await
    }

    /// Serves until `shutdown` resolves, then stops every subsystem. Transcoders are killed
    /// and their artifacts removed before this returns.
    pub async fn run_until<S>(&self, shutdown: S) -> Result<(), ControllerError>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::new(self.config.bind_ip()?, self.config.server.port);
        let storage: Arc<dyn ArtifactStorage> = self.storage.clone();

        let hub = Arc::new(ConnectionHub::new(self.config.server.max_connections));
        let launcher = Arc::new(FfmpegLauncher::new(
            self.config.transcoder.clone(),
            self.config.storage.output_dir.clone(),
        ));
        let manager = SessionManager::new(
            ManagerSettings::from_config(&self.config),
            launcher,
            storage.clone(),
            hub.clone(),
        );
        let sessions = manager.handle();
        let manager_task = tokio::spawn(manager.run());

        let janitor = Janitor::spawn(
            storage.clone(),
            self.config.retention(),
            self.config.cleanup_interval(),
        );
        let liveness = hub.spawn_liveness(self.config.ping_interval());

        let server = WebServer::new(
            hub.clone(),
            sessions.clone(),
            ArtifactGateway::new(storage, sessions.clone()),
        );
        let result = server.start(addr, shutdown).await;
        if let Err(ref e) = result {
            error!("Web server failed: {}", e);
        }

        info!("Shutting down");
        sessions.shutdown().await;
        if let Err(e) = manager_task.await {
            warn!("Session manager ended abnormally: {}", e);
        }
        liveness.stop().await;
        janitor.stop().await;
        info!("Shutdown complete");

        result.map_err(ControllerError::from)
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = terminate.recv() => info!("Received SIGTERM"),
                }
                return;
            }
            Err(e) => warn!("Unable to listen for SIGTERM: {}", e),
        }
    }
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C"),
        Err(e) => {
            error!("Unable to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
