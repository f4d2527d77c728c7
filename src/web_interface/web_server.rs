use log::info;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use warp::{Filter, Rejection, Reply};

use super::connection_hub::ConnectionHub;
use super::routes::{
    control_channel_route, dashboard_route, health_route, hls_route, list_streams_route,
};
use crate::error_handling::types::WebError;
use crate::session_management::SessionManagerHandle;
use crate::storage::ArtifactGateway;

/// Web server for the control channel, HLS retrieval and the admin API
pub struct WebServer {
    hub: Arc<ConnectionHub>,
    sessions: SessionManagerHandle,
    gateway: ArtifactGateway,
}

impl WebServer {
    pub fn new(
        hub: Arc<ConnectionHub>,
        sessions: SessionManagerHandle,
        gateway: ArtifactGateway,
    ) -> Self {
        Self {
            hub,
            sessions,
            gateway,
        }
    }

    pub fn routes(&self) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        dashboard_route()
            .or(control_channel_route(self.hub.clone(), self.sessions.clone()))
            .or(hls_route(self.gateway.clone()))
            .or(list_streams_route(self.sessions.clone()))
            .or(health_route(self.hub.clone(), self.sessions.clone()))
    }

    /// Serves until `shutdown` resolves, then lets in-flight requests finish.
    pub async fn start<S>(&self, addr: SocketAddr, shutdown: S) -> Result<(), WebError>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WebError::BindFailed(format!("{}: {}", addr, e)))?;

        info!("Web server listening on http://{}", addr);
        warp::serve(self.routes())
            .incoming(listener)
            .graceful(async move {
                shutdown.await;
                info!("Web server stopping");
            })
            .run()
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_management::Notifier;
    use crate::storage::{ArtifactStorage, FileStorage};
    use crate::test_support::spawn_manager;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    fn server(dir: &TempDir) -> (WebServer, SessionManagerHandle) {
        let hub = Arc::new(ConnectionHub::new(4));
        let notifier: Arc<dyn Notifier> = hub.clone();
        let storage: Arc<dyn ArtifactStorage> = Arc::new(FileStorage::new(dir.path()).unwrap());
        let sessions = spawn_manager(storage.clone(), notifier);
        let gateway = ArtifactGateway::new(storage, sessions.clone());
        (WebServer::new(hub, sessions.clone(), gateway), sessions)
    }

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn occupied_address_is_reported_not_panicked() {
        let dir = TempDir::new().unwrap();
        let (server, sessions) = server(&dir);
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();

        let result = server
            .start(taken.local_addr().unwrap(), std::future::pending())
            .await;

        assert!(matches!(result, Err(WebError::BindFailed(_))));
        sessions.shutdown().await;
    }

    #[tokio::test]
    async fn serves_until_shutdown_signal() {
        let dir = TempDir::new().unwrap();
        let (server, sessions) = server(&dir);
        let addr: SocketAddr = format!("127.0.0.1:{}", free_port()).parse().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let running = tokio::spawn(async move {
            server
                .start(addr, async move {
                    let _ = stop_rx.await;
                })
                .await
        });

        let mut stream = loop {
            match TcpStream::connect(addr).await {
                Ok(stream) => break stream,
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }
        };
        stream
            .write_all(b"GET /api/health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
        assert!(response.contains("\"status\":\"ok\""));

        stop_tx.send(()).unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        sessions.shutdown().await;
    }
}
