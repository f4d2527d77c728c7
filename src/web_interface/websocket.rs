use futures_util::{SinkExt, StreamExt};
use log::{debug, trace, warn};
use std::sync::Arc;
use warp::ws::{Message, WebSocket};

use crate::error_handling::types::ProtocolError;
use crate::session_management::{ConnectionId, SessionManagerHandle};
use crate::web_interface::connection_hub::{ConnectionHub, Outbound, POLICY_VIOLATION};
use crate::web_interface::protocol::{parse_client_message, ClientMessage, ServerMessage};

/// Drives one control connection from upgrade to close.
///
/// Whatever ends the loop, the session manager is told about the close before the
/// connection leaves the hub.
pub async fn handle_connection(
    socket: WebSocket,
    hub: Arc<ConnectionHub>,
    sessions: SessionManagerHandle,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (id, mut outbound_rx) = match hub.register() {
        Ok(registered) => registered,
        Err(e) => {
            let _ = ws_tx
                .send(Message::text(ServerMessage::error(e.to_string()).to_json()))
                .await;
            let _ = ws_tx
                .send(Message::close_with(POLICY_VIOLATION, e.to_string()))
                .await;
            return;
        }
    };

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => match outbound {
                Some(Outbound::Frame(message)) => {
                    if let Err(e) = ws_tx.send(Message::text(message.to_json())).await {
                        debug!("[conn {}] Write failed: {}", id, e);
                        break;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    debug!("[conn {}] Closing: {}", id, reason);
                    let _ = ws_tx.send(Message::close_with(code, reason)).await;
                    break;
                }
                None => break,
            },
            inbound = ws_rx.next() => match inbound {
                Some(Ok(message)) => {
                    hub.touch(id);
                    if message.is_close() {
                        break;
                    }
                    if message.is_ping() || message.is_pong() {
                        trace!("[conn {}] Transport keep-alive", id);
                        continue;
                    }
                    // Binary frames carry the same JSON payload as text frames.
                    match std::str::from_utf8(message.as_bytes()) {
                        Ok(text) => dispatch(id, text, &hub, &sessions).await,
                        Err(_) => {
                            debug!("[conn {}] Payload is not UTF-8", id);
                            let err = ProtocolError::Malformed("payload is not UTF-8".to_string());
                            reply(id, &hub, ServerMessage::error(err.to_string()));
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!("[conn {}] Read failed: {}", id, e);
                    break;
                }
                None => break,
            },
        }
    }

    sessions.connection_closed(id).await;
    hub.unregister(id);
    let _ = ws_tx.close().await;
}

/// Handles one inbound text frame. Errors are answered on the same connection, which stays
/// open.
pub async fn dispatch(
    id: ConnectionId,
    text: &str,
    hub: &ConnectionHub,
    sessions: &SessionManagerHandle,
) {
    let response = match parse_client_message(text) {
        Ok(ClientMessage::StartStream { rtsp_url }) => {
            match sessions.request_start(id, &rtsp_url).await {
                // Started, or the spawn error, is notified by the session manager.
                Ok(session_id) => {
                    debug!("[conn {}] Requested session {}", id, session_id);
                    None
                }
                Err(e) => Some(ServerMessage::from_session_error(&e)),
            }
        }
        Ok(ClientMessage::StopStream { stream_id }) => {
            match sessions.request_stop(id, &stream_id).await {
                Ok(()) => None,
                Err(e) => Some(ServerMessage::from_session_error(&e)),
            }
        }
        Ok(ClientMessage::Pong) => {
            trace!("[conn {}] Liveness reply", id);
            None
        }
        Err(e) => {
            debug!("[conn {}] Bad frame: {:?}", id, e);
            Some(ServerMessage::error(e.to_string()))
        }
    };

    if let Some(message) = response {
        reply(id, hub, message);
    }
}

fn reply(id: ConnectionId, hub: &ConnectionHub, message: ServerMessage) {
    if hub.send(id, message).is_err() {
        debug!("[conn {}] Reply dropped, connection gone", id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_management::Notifier;
    use crate::storage::FileStorage;
    use crate::test_support::spawn_manager;
    use tempfile::TempDir;
    use crate::session_management::SessionState;
    use crate::web_interface::routes::control_channel_route;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;
    use warp::test::WsClient;

    struct Fixture {
        hub: Arc<ConnectionHub>,
        sessions: SessionManagerHandle,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        fixture_with_limit(8)
    }

    fn fixture_with_limit(max_connections: usize) -> Fixture {
        let dir = TempDir::new().unwrap();
        let hub = Arc::new(ConnectionHub::new(max_connections));
        let notifier: Arc<dyn Notifier> = hub.clone();
        let sessions = spawn_manager(Arc::new(FileStorage::new(dir.path()).unwrap()), notifier);
        Fixture {
            hub,
            sessions,
            _dir: dir,
        }
    }

    /// Next frame queued for the connection, waiting for asynchronous notifications.
    async fn next_frame(rx: &mut UnboundedReceiver<Outbound>) -> ServerMessage {
        let outbound = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match outbound {
            Outbound::Frame(message) => message,
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_get_errors() {
        let f = fixture();
        let (id, mut rx) = f.hub.register().unwrap();

        dispatch(id, "{not json", &f.hub, &f.sessions).await;
        dispatch(id, r#"{"type":"subscribe"}"#, &f.hub, &f.sessions).await;

        assert_eq!(
            next_frame(&mut rx).await,
            ServerMessage::error("Invalid message format")
        );
        assert_eq!(
            next_frame(&mut rx).await,
            ServerMessage::error("Unknown message type: subscribe")
        );
        assert_eq!(f.hub.connection_count(), 1);
        f.sessions.shutdown().await;
    }

    #[tokio::test]
    async fn start_and_stop_round_trip() {
        let f = fixture();
        let (id, mut rx) = f.hub.register().unwrap();

        dispatch(
            id,
            r#"{"type":"startStream","rtspUrl":"rtsp://cam.local/live"}"#,
            &f.hub,
            &f.sessions,
        )
        .await;
        let stream_id = match next_frame(&mut rx).await {
            ServerMessage::StreamStarted { stream_id, hls_url } => {
                assert_eq!(hls_url, format!("/hls/{}.m3u8", stream_id));
                stream_id
            }
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(f.hub.joined_sessions(id), vec![stream_id.clone()]);

        let stop = format!(r#"{{"type":"stopStream","streamId":"{}"}}"#, stream_id);
        dispatch(id, &stop, &f.hub, &f.sessions).await;
        assert_eq!(
            next_frame(&mut rx).await,
            ServerMessage::StreamStopped {
                stream_id: stream_id.clone()
            }
        );
        assert!(f.hub.joined_sessions(id).is_empty());

        dispatch(id, &stop, &f.hub, &f.sessions).await;
        assert_eq!(
            next_frame(&mut rx).await,
            ServerMessage::error(format!("Stream not found: {}", stream_id))
        );
        f.sessions.shutdown().await;
    }

    #[tokio::test]
    async fn rejected_source_is_reported() {
        let f = fixture();
        let (id, mut rx) = f.hub.register().unwrap();

        dispatch(
            id,
            r#"{"type":"startStream","rtspUrl":"http://cam.local/live"}"#,
            &f.hub,
            &f.sessions,
        )
        .await;

        match next_frame(&mut rx).await {
            ServerMessage::Error { message, stream_id } => {
                assert!(message.starts_with("Invalid stream URL"));
                assert!(message.contains("scheme"));
                assert!(stream_id.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(f.sessions.list_sessions().await.unwrap().is_empty());
        f.sessions.shutdown().await;
    }

    #[tokio::test]
    async fn pong_is_silent() {
        let f = fixture();
        let (id, mut rx) = f.hub.register().unwrap();

        dispatch(id, r#"{"type":"pong"}"#, &f.hub, &f.sessions).await;

        assert!(rx.try_recv().is_err());
        f.sessions.shutdown().await;
    }

    async fn connect(f: &Fixture) -> WsClient {
        warp::test::ws()
            .path("/ws")
            .handshake(control_channel_route(f.hub.clone(), f.sessions.clone()))
            .await
            .unwrap()
    }

    async fn recv_json(client: &mut WsClient) -> Value {
        let message = timeout(Duration::from_secs(2), client.recv())
            .await
            .unwrap()
            .unwrap();
        serde_json::from_str(message.to_str().unwrap()).unwrap()
    }

    async fn wait_for_connections(hub: &ConnectionHub, expected: usize) {
        timeout(Duration::from_secs(2), async {
            while hub.connection_count() != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn connection_over_the_limit_gets_error_then_close() {
        let f = fixture_with_limit(1);
        let _first = connect(&f).await;
        wait_for_connections(&f.hub, 1).await;

        let mut second = connect(&f).await;

        let frame = recv_json(&mut second).await;
        assert_eq!(frame["type"], "error");
        assert_eq!(frame["message"], "Connection limit reached (1)");
        assert!(timeout(Duration::from_secs(2), second.recv_closed())
            .await
            .unwrap()
            .is_ok());
        assert_eq!(f.hub.connection_count(), 1);
        f.sessions.shutdown().await;
    }

    #[tokio::test]
    async fn binary_frames_are_decoded_like_text() {
        let f = fixture();
        let mut client = connect(&f).await;

        client
            .send(Message::binary(br#"{"type":"bogus"}"#.to_vec()))
            .await;
        let frame = recv_json(&mut client).await;
        assert_eq!(frame["type"], "error");
        assert_eq!(frame["message"], "Unknown message type: bogus");

        client.send(Message::binary(vec![0xff, 0xfe, 0x00])).await;
        let frame = recv_json(&mut client).await;
        assert_eq!(frame["type"], "error");
        assert_eq!(frame["message"], "Invalid message format");

        assert_eq!(f.hub.connection_count(), 1);
        f.sessions.shutdown().await;
    }

    #[tokio::test]
    async fn transport_close_detaches_viewer_before_unregistering() {
        let f = fixture();
        let mut client = connect(&f).await;
        client
            .send_text(r#"{"type":"startStream","rtspUrl":"rtsp://cam.local/live"}"#)
            .await;
        let started = recv_json(&mut client).await;
        assert_eq!(started["type"], "streamStarted");
        let stream_id = started["streamId"].as_str().unwrap().to_string();

        drop(client);
        wait_for_connections(&f.hub, 0).await;

        let list = f.sessions.list_sessions().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id.as_str(), stream_id);
        assert_eq!(list[0].status, SessionState::Draining);
        assert_eq!(list[0].viewer_count, 0);
        f.sessions.shutdown().await;
    }

    #[tokio::test]
    async fn liveness_close_ends_the_connection() {
        let f = fixture();
        let mut client = connect(&f).await;
        wait_for_connections(&f.hub, 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let report = f.hub.sweep_liveness(Duration::from_millis(1));

        assert_eq!(report.closed, 1);
        assert!(timeout(Duration::from_secs(2), client.recv_closed())
            .await
            .unwrap()
            .is_ok());
        wait_for_connections(&f.hub, 0).await;
        f.sessions.shutdown().await;
    }
}
