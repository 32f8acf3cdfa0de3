use std::path::PathBuf;

use thiserror::Error;

use crate::auth::CredentialError;
use crate::checkpoint::CheckpointError;
use crate::cloud::GatewayError;

/// Failure while packaging a page and writing the archive to disk.
///
/// Packaging and persisting are retried together, so a truncated stream
/// re-requests the whole archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Failed to write archive {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ArchiveError {
    /// Remote failures follow the gateway's classification; local disk
    /// failures are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ArchiveError::Gateway(e) => e.is_retryable(),
            ArchiveError::Write { .. } => false,
        }
    }
}

/// Reason a category pipeline failed. The last saved checkpoint is left
/// untouched in every case.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Listing page {start} failed: {source}")]
    Listing {
        start: u32,
        #[source]
        source: GatewayError,
    },

    #[error("Archiving items {first}-{last} failed: {source}")]
    Archive {
        first: u64,
        last: u64,
        #[source]
        source: ArchiveError,
    },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("Failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Pipeline task ended abnormally")]
    Aborted,
}
