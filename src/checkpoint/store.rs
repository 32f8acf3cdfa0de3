//! Checkpoint store trait and JSON file implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::error::CheckpointError;
use super::types::CheckpointRecord;
use crate::types::Category;

/// Durable per-category progress.
///
/// Implementations do not cache: every `load` reflects what is on disk and
/// every `save` replaces the whole record.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the category's record, creating and persisting the initial
    /// record if none exists yet.
    async fn load(&self, category: Category) -> Result<CheckpointRecord, CheckpointError>;

    /// Replace the category's record.
    async fn save(
        &self,
        category: Category,
        record: &CheckpointRecord,
    ) -> Result<(), CheckpointError>;
}

/// One pretty-printed JSON file per category inside `directory`.
#[derive(Debug, Clone)]
pub struct JsonCheckpointStore {
    directory: PathBuf,
    page_size: u32,
}

impl JsonCheckpointStore {
    /// `page_size` only applies to categories without a stored record.
    pub fn new(directory: impl Into<PathBuf>, page_size: u32) -> Self {
        Self {
            directory: directory.into(),
            page_size,
        }
    }

    pub fn path_for(&self, category: Category) -> PathBuf {
        self.directory.join(category.checkpoint_file_name())
    }

    /// Read a stored record without creating one. Used by read-only commands.
    pub async fn peek(
        &self,
        category: Category,
    ) -> Result<Option<CheckpointRecord>, CheckpointError> {
        let path = self.path_for(category);
        match fs::read(&path).await {
            Ok(bytes) => decode(&path, &bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CheckpointError::io(path, e)),
        }
    }
}

fn decode(path: &Path, bytes: &[u8]) -> Result<CheckpointRecord, CheckpointError> {
    serde_json::from_slice(bytes).map_err(|source| CheckpointError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `contents` to `<path>.tmp`, fsync, then rename over `path` so a
/// crash leaves either the old file or the new one. With `owner_only` the
/// file is created readable by its owner alone on Unix.
pub(crate) async fn replace_file(
    path: &Path,
    contents: &[u8],
    owner_only: bool,
) -> std::io::Result<()> {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    let tmp_path = path.with_file_name(name);

    // A leftover temp file would keep its old mode.
    let _ = fs::remove_file(&tmp_path).await;
    let result = async {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            if owner_only {
                options.mode(0o600);
            }
        }
        #[cfg(not(unix))]
        let _ = owner_only;
        let mut file = options.open(&tmp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp_path, path).await
    }
    .await;
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path).await;
    }
    result
}

#[async_trait]
impl CheckpointStore for JsonCheckpointStore {
    async fn load(&self, category: Category) -> Result<CheckpointRecord, CheckpointError> {
        match self.peek(category).await? {
            Some(record) => {
                tracing::debug!(%category, "Loaded checkpoint from {}", self.path_for(category).display());
                Ok(record)
            }
            None => {
                let record = CheckpointRecord::new(self.page_size);
                self.save(category, &record).await?;
                tracing::info!(%category, "Created checkpoint at {}", self.path_for(category).display());
                Ok(record)
            }
        }
    }

    async fn save(
        &self,
        category: Category,
        record: &CheckpointRecord,
    ) -> Result<(), CheckpointError> {
        let path = self.path_for(category);
        let json = serde_json::to_vec_pretty(record)?;
        replace_file(&path, &json, false)
            .await
            .map_err(|e| CheckpointError::io(&path, e))?;
        tracing::debug!(
            %category,
            start = record.current().parameters.start,
            items = record.current().cumulative_item_count,
            "Saved checkpoint"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::types::ArchiveRecord;
    use std::fs as stdfs;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("btcloud-backup")
            .join("checkpoint_store_tests")
            .join(name);
        let _ = stdfs::remove_dir_all(&dir);
        stdfs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_load_creates_and_persists_initial_record() {
        let dir = test_dir("load_creates");
        let store = JsonCheckpointStore::new(&dir, 500);
        assert!(!store.path_for(Category::Documents).exists());

        let record = store.load(Category::Documents).await.unwrap();
        assert_eq!(record, CheckpointRecord::new(500));
        assert!(dir.join("documentCheckpoint.json").exists());

        let again = store.peek(Category::Documents).await.unwrap();
        assert_eq!(again, Some(record));
    }

    #[tokio::test]
    async fn test_save_then_load_roundtrip() {
        let dir = test_dir("save_load");
        let store = JsonCheckpointStore::new(&dir, 500);
        let mut record = store.load(Category::Photos).await.unwrap();
        let next = record.current().advance(
            500,
            Some("cursor-2".into()),
            ArchiveRecord {
                file_name: "Zip1-500.zip".into(),
                bytes: 1234,
                sha256: "ab".repeat(32),
            },
        );
        record.push(next);
        store.save(Category::Photos, &record).await.unwrap();

        let loaded = store.load(Category::Photos).await.unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.current().parameters.start, 2);
        assert!(!dir.join("photosVideosCheckpoint.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_categories_use_separate_files() {
        let dir = test_dir("separate_files");
        let store = JsonCheckpointStore::new(&dir, 500);
        for category in Category::ALL {
            store.load(category).await.unwrap();
        }
        assert!(dir.join("documentCheckpoint.json").exists());
        assert!(dir.join("photosVideosCheckpoint.json").exists());
        assert!(dir.join("audioCheckpoint.json").exists());
    }

    #[tokio::test]
    async fn test_malformed_record_is_fatal_and_untouched() {
        let dir = test_dir("malformed");
        let store = JsonCheckpointStore::new(&dir, 500);
        let path = store.path_for(Category::Audio);
        stdfs::write(&path, b"{ not json").unwrap();

        let err = store.load(Category::Audio).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Malformed { .. }));
        assert_eq!(stdfs::read(&path).unwrap(), b"{ not json");
    }

    #[tokio::test]
    async fn test_page_size_only_applies_to_new_records() {
        let dir = test_dir("page_size");
        JsonCheckpointStore::new(&dir, 500)
            .load(Category::Documents)
            .await
            .unwrap();
        let record = JsonCheckpointStore::new(&dir, 50)
            .load(Category::Documents)
            .await
            .unwrap();
        assert_eq!(record.current().parameters.count, 500);
    }

    #[tokio::test]
    async fn test_save_failure_keeps_previous_record() {
        let dir = test_dir("save_failure");
        let store = JsonCheckpointStore::new(&dir, 500);
        let record = store.load(Category::Documents).await.unwrap();

        // A directory where the temp file should go makes the write fail.
        stdfs::create_dir_all(dir.join("documentCheckpoint.json.tmp")).unwrap();
        let mut changed = record.clone();
        changed.push(record.current().terminated());
        assert!(store.save(Category::Documents, &changed).await.is_err());

        let loaded = store.load(Category::Documents).await.unwrap();
        assert_eq!(loaded, record);
    }
}
