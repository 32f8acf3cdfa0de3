use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

use super::error::CheckpointError;

const LOCK_FILE_NAME: &str = "backup.lock";

/// Exclusive advisory lock on the backup directory, preventing two processes
/// from advancing the same checkpoints. Released when dropped.
#[derive(Debug)]
pub struct BackupLock {
    _file: std::fs::File,
    path: PathBuf,
}

impl BackupLock {
    pub async fn acquire(directory: &Path) -> Result<Self, CheckpointError> {
        let path = directory.join(LOCK_FILE_NAME);
        let lock_path = path.clone();
        let file = tokio::task::spawn_blocking(move || {
            let file = std::fs::File::create(&lock_path)
                .map_err(|e| CheckpointError::io(&lock_path, e))?;
            file.try_lock_exclusive()
                .map_err(|_| CheckpointError::Locked(lock_path.clone()))?;
            Ok::<std::fs::File, CheckpointError>(file)
        })
        .await
        .map_err(|e| CheckpointError::io(&path, std::io::Error::other(e)))??;

        tracing::debug!("Acquired backup lock {}", path.display());
        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
