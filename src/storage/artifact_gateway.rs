use log::{debug, error};
use std::sync::Arc;

use crate::error_handling::types::StorageError;
use crate::session_management::{SessionId, SessionManagerHandle};
use crate::storage::artifact::{PLAYLIST_CONTENT_TYPE, PLAYLIST_EXTENSION, SEGMENT_CONTENT_TYPE};
use crate::storage::storage_trait::ArtifactStorage;

/// A requested artifact file name, split into session id and segment token.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactRequest {
    Playlist(SessionId),
    Segment { session_id: SessionId, token: String },
}

impl ArtifactRequest {
    /// Parses `<id>.m3u8` or `<id>-<token>`. Session ids never contain `-` or `.`.
    pub fn parse(file_name: &str) -> Option<Self> {
        if let Some(raw_id) = file_name
            .strip_suffix(PLAYLIST_EXTENSION)
            .and_then(|rest| rest.strip_suffix('.'))
        {
            return SessionId::parse(raw_id).map(ArtifactRequest::Playlist);
        }
        let (raw_id, token) = file_name.split_once('-')?;
        let session_id = SessionId::parse(raw_id)?;
        Some(ArtifactRequest::Segment {
            session_id,
            token: token.to_string(),
        })
    }

    pub fn session_id(&self) -> &SessionId {
        match self {
            ArtifactRequest::Playlist(id) => id,
            ArtifactRequest::Segment { session_id, .. } => session_id,
        }
    }
}

#[derive(Debug)]
pub struct ServedArtifact {
    pub body: Vec<u8>,
    pub content_type: &'static str,
}

/// Read access to artifacts, limited to sessions that are still registered.
///
/// Files of a finished session may linger until purged or swept; they are never served.
#[derive(Clone)]
pub struct ArtifactGateway {
    storage: Arc<dyn ArtifactStorage>,
    sessions: SessionManagerHandle,
}

impl ArtifactGateway {
    pub fn new(storage: Arc<dyn ArtifactStorage>, sessions: SessionManagerHandle) -> Self {
        Self { storage, sessions }
    }

    pub async fn serve(&self, request: ArtifactRequest) -> Result<ServedArtifact, StorageError> {
        match request {
            ArtifactRequest::Playlist(session_id) => self.serve_playlist(&session_id).await,
            ArtifactRequest::Segment { session_id, token } => {
                self.serve_segment(&session_id, &token).await
            }
        }
    }

    pub async fn serve_playlist(&self, session_id: &SessionId) -> Result<ServedArtifact, StorageError> {
        self.ensure_live(session_id).await?;
        let storage = self.storage.clone();
        let id = session_id.clone();
        let body = run_blocking(move || storage.read_playlist(&id)).await?;
        Ok(ServedArtifact {
            body,
            content_type: PLAYLIST_CONTENT_TYPE,
        })
    }

    pub async fn serve_segment(
        &self,
        session_id: &SessionId,
        token: &str,
    ) -> Result<ServedArtifact, StorageError> {
        self.ensure_live(session_id).await?;
        let storage = self.storage.clone();
        let id = session_id.clone();
        let token = token.to_string();
        let body = run_blocking(move || storage.read_segment(&id, &token)).await?;
        Ok(ServedArtifact {
            body,
            content_type: SEGMENT_CONTENT_TYPE,
        })
    }

    async fn ensure_live(&self, session_id: &SessionId) -> Result<(), StorageError> {
        if self.sessions.is_live(session_id).await {
            Ok(())
        } else {
            debug!("[{}] Artifact requested for a session that is not live", session_id);
            Err(StorageError::NotFound)
        }
    }
}

async fn run_blocking<F>(read: F) -> Result<Vec<u8>, StorageError>
where
    F: FnOnce() -> Result<Vec<u8>, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(read).await.map_err(|e| {
        error!("Artifact read task failed: {}", e);
        StorageError::ReadFailed(std::io::Error::other(e.to_string()))
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileStorage;
    use crate::test_support::{spawn_manager, NullNotifier};
    use tempfile::TempDir;

    fn gateway(dir: &TempDir) -> (ArtifactGateway, SessionManagerHandle) {
        let storage: Arc<dyn ArtifactStorage> = Arc::new(FileStorage::new(dir.path()).unwrap());
        let sessions = spawn_manager(storage.clone(), Arc::new(NullNotifier));
        (ArtifactGateway::new(storage, sessions.clone()), sessions)
    }

    #[test]
    fn parses_playlist_and_segment_names() {
        let id = SessionId::parse("stream_1700000000000_abcdef12").unwrap();
        assert_eq!(
            ArtifactRequest::parse("stream_1700000000000_abcdef12.m3u8"),
            Some(ArtifactRequest::Playlist(id.clone()))
        );
        assert_eq!(
            ArtifactRequest::parse("stream_1700000000000_abcdef12-004.ts"),
            Some(ArtifactRequest::Segment {
                session_id: id,
                token: "004.ts".into()
            })
        );
        for name in ["", "index.m3u8", "stream_1_abcdef12", "..-000.ts", "stream_1_abcdef12m3u8"] {
            assert!(ArtifactRequest::parse(name).is_none(), "accepted {:?}", name);
        }
    }

    #[tokio::test]
    async fn serves_artifacts_of_live_sessions() {
        let dir = TempDir::new().unwrap();
        let (gateway, sessions) = gateway(&dir);
        let id = sessions.request_start(1, "rtsp://cam.local/live").await.unwrap();
        std::fs::write(dir.path().join(format!("{}.m3u8", id)), b"#EXTM3U\n").unwrap();
        std::fs::write(dir.path().join(format!("{}-000.ts", id)), b"ts").unwrap();

        let playlist = gateway.serve_playlist(&id).await.unwrap();
        assert_eq!(playlist.body, b"#EXTM3U\n");
        assert_eq!(playlist.content_type, "application/vnd.apple.mpegurl");

        let segment = gateway
            .serve(ArtifactRequest::Segment {
                session_id: id.clone(),
                token: "000.ts".into(),
            })
            .await
            .unwrap();
        assert_eq!(segment.content_type, "video/mp2t");

        assert!(matches!(
            gateway.serve_segment(&id, "001.ts").await,
            Err(StorageError::NotFound)
        ));
        assert!(matches!(
            gateway.serve_segment(&id, "../secret.ts").await,
            Err(StorageError::InvalidName(_))
        ));
        sessions.shutdown().await;
    }

    #[tokio::test]
    async fn refuses_files_of_unknown_sessions() {
        let dir = TempDir::new().unwrap();
        let (gateway, sessions) = gateway(&dir);
        let stale = SessionId::generate();
        std::fs::write(dir.path().join(format!("{}.m3u8", stale)), b"#EXTM3U\n").unwrap();

        assert!(matches!(
            gateway.serve_playlist(&stale).await,
            Err(StorageError::NotFound)
        ));
        sessions.shutdown().await;
    }
}
