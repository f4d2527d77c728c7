//! Storage Trait
//!
//! This module defines the `ArtifactStorage` trait, the interface over the directory the
//! transcoder writes into.
//!
//! Implementors of this trait are responsible for:
//! - Reading manifests and segments by session id
//! - Deleting a session's files on cleanup
//! - Enumerating and age-sweeping the directory for the janitor
//!
//! Deleting a file that is already gone is never an error.

use std::time::Duration;

use crate::error_handling::types::StorageError;
use crate::session_management::SessionId;
use crate::storage::artifact::Artifact;

pub trait ArtifactStorage: Send + Sync {
    /// Reads `<id>.m3u8`.
    fn read_playlist(&self, session_id: &SessionId) -> Result<Vec<u8>, StorageError>;

    /// Reads `<id>-<token>`. `token` is validated before touching the filesystem.
    fn read_segment(&self, session_id: &SessionId, token: &str) -> Result<Vec<u8>, StorageError>;

    /// Deletes every file prefixed by the session id and returns how many were removed.
    fn purge(&self, session_id: &SessionId) -> Result<usize, StorageError>;

    /// Lists the files currently in the directory.
    fn list_artifacts(&self) -> Result<Vec<Artifact>, StorageError>;

    /// Deletes every file last modified more than `max_age` ago, whoever owns it.
    fn sweep_older_than(&self, max_age: Duration) -> Result<usize, StorageError>;
}
