use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use crate::error_handling::types::StorageError;
use crate::session_management::SessionId;
use crate::storage::artifact::{
    belongs_to, classify, playlist_file_name, segment_file_name, Artifact,
};
use crate::storage::storage_trait::ArtifactStorage;

/// Filesystem-backed artifact store over a single flat directory.
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).map_err(|e| {
            error!("Failed to create output dir {}: {}", base_path.display(), e);
            StorageError::InitFailed(e)
        })?;
        info!("FileStorage initialized at {}", base_path.display());
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn read_file(&self, file_name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.base_path.join(file_name);
        fs::read(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                debug!("Artifact {} not found", path.display());
                StorageError::NotFound
            } else {
                error!("Read failed {}: {}", path.display(), e);
                StorageError::ReadFailed(e)
            }
        })
    }

    /// Plain files of the directory. A missing directory reads as empty.
    fn entries(&self) -> Result<Vec<fs::DirEntry>, StorageError> {
        let dir = match fs::read_dir(&self.base_path) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                error!(
                    "Failed to read output dir {}: {}",
                    self.base_path.display(),
                    e
                );
                return Err(StorageError::ReadFailed(e));
            }
        };
        let mut entries = Vec::new();
        for entry in dir {
            match entry {
                Ok(entry) if entry.file_type().map(|t| t.is_file()).unwrap_or(false) => {
                    entries.push(entry)
                }
                Ok(_) => {}
                Err(e) => warn!("Dir entry error: {}", e),
            }
        }
        Ok(entries)
    }
}

/// Removes `path`, treating an already-missing file as removed.
fn remove_idempotent(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

impl ArtifactStorage for FileStorage {
    fn read_playlist(&self, session_id: &SessionId) -> Result<Vec<u8>, StorageError> {
        self.read_file(&playlist_file_name(session_id))
    }

    fn read_segment(&self, session_id: &SessionId, token: &str) -> Result<Vec<u8>, StorageError> {
        let file_name = segment_file_name(session_id, token)?;
        self.read_file(&file_name)
    }

    fn purge(&self, session_id: &SessionId) -> Result<usize, StorageError> {
        let mut removed = 0usize;
        let mut first_error = None;
        for entry in self.entries()? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !belongs_to(&name, session_id) {
                continue;
            }
            match remove_idempotent(&entry.path()) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("[{}] Failed to delete {}: {}", session_id, name, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        debug!("[{}] Purged {} artifact(s)", session_id, removed);
        match first_error {
            Some(e) => Err(StorageError::CleanupFailed(e)),
            None => Ok(removed),
        }
    }

    fn list_artifacts(&self) -> Result<Vec<Artifact>, StorageError> {
        let mut artifacts = Vec::new();
        for entry in self.entries()? {
            // Files may vanish between listing and stat.
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let written_at: DateTime<Utc> = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            artifacts.push(Artifact {
                kind: classify(&file_name),
                file_name,
                size: metadata.len(),
                written_at,
            });
        }
        Ok(artifacts)
    }

    fn sweep_older_than(&self, max_age: Duration) -> Result<usize, StorageError> {
        let now = SystemTime::now();
        let mut removed = 0usize;
        for entry in self.entries()? {
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(_) => continue,
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age <= max_age {
                continue;
            }
            let path = entry.path();
            match remove_idempotent(&path) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to delete expired artifact {}: {}", path.display(), e),
            }
        }
        if removed > 0 {
            info!(
                "Removed {} artifact(s) older than {}s",
                removed,
                max_age.as_secs()
            );
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &[u8]) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    #[test]
    fn test_read_playlist_and_segment() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let id = SessionId::generate();
        write(&dir, &format!("{}.m3u8", id), b"#EXTM3U\n");
        write(&dir, &format!("{}-000.ts", id), b"segment");

        assert_eq!(storage.read_playlist(&id).unwrap(), b"#EXTM3U\n");
        assert_eq!(storage.read_segment(&id, "000.ts").unwrap(), b"segment");
        assert!(matches!(
            storage.read_segment(&id, "001.ts"),
            Err(StorageError::NotFound)
        ));
    }

    #[test]
    fn test_read_segment_rejects_traversal_tokens() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let id = SessionId::generate();

        assert!(matches!(
            storage.read_segment(&id, "../../etc/passwd"),
            Err(StorageError::InvalidName(_))
        ));
    }

    #[test]
    fn test_purge_only_touches_own_files_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let id = SessionId::generate();
        let other = SessionId::generate();
        write(&dir, &format!("{}.m3u8", id), b"a");
        write(&dir, &format!("{}-000.ts", id), b"b");
        write(&dir, &format!("{}-001.ts", id), b"c");
        write(&dir, &format!("{}.m3u8", other), b"d");

        assert_eq!(storage.purge(&id).unwrap(), 3);
        assert_eq!(storage.purge(&id).unwrap(), 0);

        let remaining: Vec<String> = storage
            .list_artifacts()
            .unwrap()
            .into_iter()
            .map(|a| a.file_name)
            .collect();
        assert_eq!(remaining, vec![format!("{}.m3u8", other)]);
    }

    #[test]
    fn test_purge_with_missing_directory_is_ok() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("hls")).unwrap();
        fs::remove_dir(storage.base_path()).unwrap();

        assert_eq!(storage.purge(&SessionId::generate()).unwrap(), 0);
        assert!(storage.list_artifacts().unwrap().is_empty());
    }

    #[test]
    fn test_sweep_respects_age_threshold() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        write(&dir, "orphan.m3u8", b"old");
        write(&dir, "orphan-000.ts", b"old");

        assert_eq!(storage.sweep_older_than(Duration::from_secs(3600)).unwrap(), 0);
        assert_eq!(storage.list_artifacts().unwrap().len(), 2);

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(storage.sweep_older_than(Duration::from_millis(10)).unwrap(), 2);
        assert!(storage.list_artifacts().unwrap().is_empty());
    }

    #[test]
    fn test_list_artifacts_classifies_files() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        write(&dir, "x.m3u8", b"1");
        write(&dir, "x-000.ts", b"22");
        fs::create_dir(dir.path().join("nested")).unwrap();

        let mut artifacts = storage.list_artifacts().unwrap();
        artifacts.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].file_name, "x-000.ts");
        assert_eq!(artifacts[0].size, 2);
        assert_eq!(artifacts[1].kind, crate::storage::artifact::ArtifactKind::Manifest);
    }
}
