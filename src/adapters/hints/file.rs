//! Hint store persisted as a JSON object file (`{"<game_id>": "<actor_id>"}`).
//!
//! The whole file is rewritten on every change through a temp file and a
//! rename, so a crash never leaves a half-written hint file behind. A missing
//! file reads as "no hints"; a corrupt one is replaced on the next change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::ports::HintStore;

type HintMap = BTreeMap<String, String>;

#[derive(Debug)]
pub struct FileHintStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileHintStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> SyncResult<HintMap> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(HintMap::new()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                warn!(path = %self.path.display(), error = %e, "hint file is corrupt");
                SyncError::decode("hints", e.to_string())
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HintMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Hints to modify, and whether the file on disk must be replaced.
    async fn read_for_update(&self) -> SyncResult<(HintMap, bool)> {
        match self.read_all().await {
            Ok(hints) => Ok((hints, false)),
            Err(SyncError::Decode { .. }) => {
                warn!(path = %self.path.display(), "discarding corrupt hint file");
                Ok((HintMap::new(), true))
            }
            Err(e) => Err(e),
        }
    }

    async fn write_all(&self, hints: &HintMap) -> SyncResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(hints)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), hints = hints.len(), "hint file written");
        Ok(())
    }
}

#[async_trait]
impl HintStore for FileHintStore {
    async fn get(&self, game_id: &str) -> SyncResult<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(game_id))
    }

    async fn set(&self, game_id: &str, actor_id: &str) -> SyncResult<()> {
        let _guard = self.lock.lock().await;
        let (mut hints, _) = self.read_for_update().await?;
        if hints.get(game_id).map(String::as_str) == Some(actor_id) {
            return Ok(());
        }
        hints.insert(game_id.to_string(), actor_id.to_string());
        self.write_all(&hints).await
    }

    async fn remove(&self, game_id: &str) -> SyncResult<()> {
        let _guard = self.lock.lock().await;
        let (mut hints, corrupt) = self.read_for_update().await?;
        if hints.remove(game_id).is_some() || corrupt {
            self.write_all(&hints).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileHintStore::new(dir.path().join("hints.json"));
        assert!(store.get("g1").await.unwrap().is_none());
        store.remove("g1").await.unwrap();
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_hints_persist_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("hints.json");

        let store = FileHintStore::new(&path);
        store.set("g1", "a1").await.unwrap();
        store.set("g2", "a9").await.unwrap();
        store.remove("g2").await.unwrap();

        let reopened = FileHintStore::new(&path);
        assert_eq!(reopened.get("g1").await.unwrap().as_deref(), Some("a1"));
        assert!(reopened.get("g2").await.unwrap().is_none());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hints.json");
        std::fs::write(&path, "not json").unwrap();

        let err = FileHintStore::new(&path).get("g1").await.unwrap_err();
        assert!(matches!(err, SyncError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_replaced_on_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hints.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileHintStore::new(&path);
        store.remove("g1").await.unwrap();
        assert!(store.get("g1").await.unwrap().is_none());

        std::fs::write(&path, "{broken").unwrap();
        store.set("g1", "a1").await.unwrap();
        assert_eq!(store.get("g1").await.unwrap().as_deref(), Some("a1"));
    }
}
