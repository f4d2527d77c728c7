//! Control channel wire format.
//!
//! Frames are JSON objects tagged by `type`. Server frames also carry an RFC 3339
//! `timestamp`.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error_handling::types::{ProtocolError, SessionError};
use crate::session_management::{SessionId, SessionNotification};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    StartStream {
        #[serde(rename = "rtspUrl")]
        rtsp_url: String,
    },
    StopStream {
        #[serde(rename = "streamId")]
        stream_id: String,
    },
    Pong,
}

const CLIENT_MESSAGE_TYPES: &[&str] = &["startStream", "stopStream", "pong"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    StreamStarted {
        #[serde(rename = "streamId")]
        stream_id: SessionId,
        #[serde(rename = "hlsUrl")]
        hls_url: String,
    },
    StreamEnded {
        #[serde(rename = "streamId")]
        stream_id: SessionId,
    },
    StreamStopped {
        #[serde(rename = "streamId")]
        stream_id: SessionId,
    },
    Error {
        message: String,
        #[serde(rename = "streamId", skip_serializing_if = "Option::is_none")]
        stream_id: Option<SessionId>,
    },
    Ping,
}

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(flatten)]
    message: &'a ServerMessage,
    timestamp: String,
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            stream_id: None,
        }
    }

    pub fn from_session_error(err: &SessionError) -> Self {
        Self::error(err.client_message())
    }

    pub fn to_json(&self) -> String {
        let envelope = Envelope {
            message: self,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        // Only strings and unit variants are serialized here.
        serde_json::to_string(&envelope).unwrap_or_else(|_| {
            r#"{"type":"error","message":"Internal error"}"#.to_string()
        })
    }
}

impl From<SessionNotification> for ServerMessage {
    fn from(notification: SessionNotification) -> Self {
        match notification {
            SessionNotification::Started { session_id } => ServerMessage::StreamStarted {
                hls_url: playlist_url(&session_id),
                stream_id: session_id,
            },
            SessionNotification::Ended { session_id } => ServerMessage::StreamEnded {
                stream_id: session_id,
            },
            SessionNotification::Stopped { session_id } => ServerMessage::StreamStopped {
                stream_id: session_id,
            },
            SessionNotification::Error {
                session_id,
                message,
            } => ServerMessage::Error {
                message,
                stream_id: session_id,
            },
        }
    }
}

/// Path under which the session's playlist is served.
pub fn playlist_url(session_id: &SessionId) -> String {
    format!("/hls/{}.m3u8", session_id)
}

/// Decodes one inbound text frame.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| ProtocolError::Malformed("missing \"type\"".to_string()))?;
    if !CLIENT_MESSAGE_TYPES.contains(&kind) {
        return Err(ProtocolError::UnknownType(kind.to_string()));
    }
    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn parses_known_messages() {
        assert_eq!(
            parse_client_message(r#"{"type":"startStream","rtspUrl":"rtsp://cam/live"}"#),
            Ok(ClientMessage::StartStream {
                rtsp_url: "rtsp://cam/live".into()
            })
        );
        assert_eq!(
            parse_client_message(r#"{"type":"stopStream","streamId":"stream_1_abcdef12"}"#),
            Ok(ClientMessage::StopStream {
                stream_id: "stream_1_abcdef12".into()
            })
        );
        assert_eq!(parse_client_message(r#"{"type":"pong"}"#), Ok(ClientMessage::Pong));
    }

    #[test]
    fn distinguishes_malformed_from_unknown() {
        let unknown = parse_client_message(r#"{"type":"subscribe"}"#).unwrap_err();
        assert_eq!(unknown.to_string(), "Unknown message type: subscribe");

        for raw in ["not json", "[]", r#"{"rtspUrl":"x"}"#, r#"{"type":"startStream"}"#, r#"{"type":7}"#] {
            let err = parse_client_message(raw).unwrap_err();
            assert_eq!(err.to_string(), "Invalid message format", "{:?}", raw);
        }
    }

    #[test]
    fn server_frames_carry_type_and_timestamp() {
        let id = SessionId::parse("stream_1700000000000_abcdef12").unwrap();
        let frame: Value = serde_json::from_str(
            &ServerMessage::from(SessionNotification::Started {
                session_id: id.clone(),
            })
            .to_json(),
        )
        .unwrap();

        assert_eq!(frame["type"], "streamStarted");
        assert_eq!(frame["streamId"], "stream_1700000000000_abcdef12");
        assert_eq!(frame["hlsUrl"], "/hls/stream_1700000000000_abcdef12.m3u8");
        let timestamp = frame["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn error_and_ping_frames() {
        let error: Value = serde_json::from_str(&ServerMessage::error("boom").to_json()).unwrap();
        assert_eq!(error["type"], "error");
        assert_eq!(error["message"], "boom");
        assert!(error.get("streamId").is_none());

        let ping: Value = serde_json::from_str(&ServerMessage::Ping.to_json()).unwrap();
        assert_eq!(ping["type"], "ping");
    }
}
