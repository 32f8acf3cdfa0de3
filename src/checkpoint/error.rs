//! Error types for checkpoint persistence.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Reading or replacing the checkpoint file failed.
    #[error("Checkpoint I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The stored record could not be decoded. Progress is never reset
    /// silently; the file has to be repaired or removed by hand.
    #[error("Checkpoint file {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to encode checkpoint: {0}")]
    Encode(#[from] serde_json::Error),

    /// Another process holds the backup lock.
    #[error("Another btcloud-backup instance is using {0}")]
    Locked(PathBuf),
}

impl CheckpointError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
