use log::{error, warn};
use std::sync::Arc;
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use super::connection_hub::ConnectionHub;
use super::types::{ApiError, HealthResponse};
use super::websocket::handle_connection;
use crate::error_handling::types::StorageError;
use crate::session_management::SessionManagerHandle;
use crate::storage::{ArtifactGateway, ArtifactRequest};

const DASHBOARD_HTML: &str = r#"<html><head><title>streamgate</title></head>
<body><h1>streamgate is running</h1>
<p>Control channel: <code>/ws</code>. Live streams: <a href="/api/streams">/api/streams</a>.
Health: <a href="/api/health">/api/health</a>.</p></body></html>"#;

fn json_error(message: &str, status: StatusCode) -> reply::Response {
    reply::with_status(reply::json(&ApiError::new(message)), status).into_response()
}

/// GET /
pub fn dashboard_route() -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path::end()
        .and(warp::get())
        .map(|| reply::html(DASHBOARD_HTML))
}

/// GET /ws
pub fn control_channel_route(
    hub: Arc<ConnectionHub>,
    sessions: SessionManagerHandle,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .map(move |ws: warp::ws::Ws| {
            let hub = hub.clone();
            let sessions = sessions.clone();
            ws.on_upgrade(move |socket| handle_connection(socket, hub, sessions))
        })
}

/// GET /hls/:file
pub fn hls_route(
    gateway: ArtifactGateway,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("hls" / String)
        .and(warp::get())
        .and_then(move |file_name: String| {
            let gateway = gateway.clone();
            async move { Ok::<_, Rejection>(serve_artifact(&gateway, &file_name).await) }
        })
}

pub async fn serve_artifact(gateway: &ArtifactGateway, file_name: &str) -> reply::Response {
    let Some(request) = ArtifactRequest::parse(file_name) else {
        return json_error("Artifact not found", StatusCode::NOT_FOUND);
    };
    match gateway.serve(request).await {
        Ok(artifact) => {
            let res = reply::with_header(
                reply::with_header(artifact.body, "Content-Type", artifact.content_type),
                "Cache-Control",
                "no-cache",
            );
            reply::with_status(res, StatusCode::OK).into_response()
        }
        Err(StorageError::NotFound) | Err(StorageError::InvalidName(_)) => {
            json_error("Artifact not found", StatusCode::NOT_FOUND)
        }
        Err(e) => {
            error!("Failed to serve {}: {}", file_name, e);
            json_error("Failed to read artifact", StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/streams
pub fn list_streams_route(
    sessions: SessionManagerHandle,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "streams")
        .and(warp::get())
        .and_then(move || {
            let sessions = sessions.clone();
            async move { Ok::<_, Rejection>(list_streams(&sessions).await) }
        })
}

pub async fn list_streams(sessions: &SessionManagerHandle) -> reply::Response {
    match sessions.list_sessions().await {
        Ok(list) => reply::with_status(reply::json(&list), StatusCode::OK).into_response(),
        Err(e) => {
            warn!("Stream listing unavailable: {}", e);
            json_error("Failed to load streams", StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

/// GET /api/health
pub fn health_route(
    hub: Arc<ConnectionHub>,
    sessions: SessionManagerHandle,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "health")
        .and(warp::get())
        .and_then(move || {
            let hub = hub.clone();
            let sessions = sessions.clone();
            async move {
                let health = health(&hub, &sessions).await;
                Ok::<_, Rejection>(reply::json(&health))
            }
        })
}

pub async fn health(hub: &ConnectionHub, sessions: &SessionManagerHandle) -> HealthResponse {
    let active_streams = sessions
        .list_sessions()
        .await
        .map(|list| list.len())
        .unwrap_or(0);
    HealthResponse {
        status: "ok",
        active_streams,
        connections: hub.connection_count(),
        max_connections: hub.max_connections(),
    }
}
