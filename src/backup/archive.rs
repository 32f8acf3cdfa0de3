//! Streams one packaged page to disk.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use indicatif::{HumanBytes, ProgressBar};
use sha2::{Digest, Sha256};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::error::ArchiveError;
use crate::checkpoint::ArchiveRecord;
use crate::cloud::ArchiveStream;

/// `Zip{first}-{last}.zip`, named for the inclusive item range it holds.
pub fn archive_file_name(first: u64, last: u64) -> String {
    format!("Zip{}-{}.zip", first, last)
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

/// Drain `stream` into `path`, hashing as it goes.
///
/// Bytes land in a `.part` file that is flushed, synced and renamed only
/// after the stream ends cleanly, so `path` never holds a partial archive.
/// Any stale `.part` from an earlier attempt is discarded first.
pub async fn write_archive(
    mut stream: ArchiveStream,
    path: &Path,
    progress: &ProgressBar,
) -> Result<ArchiveRecord, ArchiveError> {
    let part = part_path(path);
    let write_err = |source: std::io::Error| ArchiveError::Write {
        path: path.to_path_buf(),
        source,
    };
    let _ = fs::remove_file(&part).await;

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&part)
        .await
        .map_err(write_err)?;

    let mut hasher = Sha256::new();
    let mut bytes: u64 = 0;
    let drained = async {
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk).await.map_err(write_err)?;
            bytes += chunk.len() as u64;
            progress.set_message(format!("{} received", HumanBytes(bytes)));
        }
        file.flush().await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        Ok::<(), ArchiveError>(())
    }
    .await;
    drop(file);

    if let Err(e) = drained {
        tracing::debug!(bytes_so_far = bytes, "Archive stream aborted: {}", e);
        let _ = fs::remove_file(&part).await;
        return Err(e);
    }

    fs::rename(&part, path).await.map_err(write_err)?;

    let sha256 = hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();
    Ok(ArchiveRecord {
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        bytes,
        sha256,
    })
}

/// Lowercase hex SHA-256 of a file on disk, read in chunks.
pub async fn file_sha256(path: &Path) -> std::io::Result<String> {
    use tokio::io::AsyncReadExt;

    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}
