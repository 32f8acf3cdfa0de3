//! Checkpoint data model.
//!
//! Field names are snake_case on disk. The PascalCase aliases let records
//! written by earlier releases load unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of items requested per page for a fresh category.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Request parameters for the next listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointParameters {
    /// 1-based page number.
    #[serde(alias = "Start")]
    pub start: u32,
    #[serde(alias = "Count")]
    pub count: u32,
    /// Continuation token from the previous page.
    #[serde(default, alias = "Cursor")]
    pub cursor: Option<String>,
}

/// The archive written for the page that produced a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub file_name: String,
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the archive contents.
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(alias = "Parameters")]
    pub parameters: CheckpointParameters,
    /// Items archived so far in this category.
    #[serde(alias = "FileCount")]
    pub cumulative_item_count: u64,
    /// Set once the remote listing has no continuation. Never cleared.
    #[serde(alias = "IsLast")]
    pub is_terminal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<ArchiveRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    /// Starting point of a category that has never been fetched.
    pub fn initial(page_size: u32) -> Self {
        Self {
            parameters: CheckpointParameters {
                start: 1,
                count: page_size,
                cursor: None,
            },
            cumulative_item_count: 0,
            is_terminal: false,
            archive: None,
            completed_at: None,
        }
    }

    /// Inclusive item range covered by an archive of `items` files fetched
    /// from this checkpoint.
    pub fn archive_range(&self, items: usize) -> (u64, u64) {
        let start = self.cumulative_item_count + 1;
        let end = self.cumulative_item_count + items as u64;
        (start, end)
    }

    /// Checkpoint after successfully archiving a page of `items` files.
    ///
    /// `start` is a page number and moves by one page, not by `items`.
    pub fn advance(
        &self,
        items: usize,
        next_cursor: Option<String>,
        archive: ArchiveRecord,
    ) -> Self {
        let is_terminal = next_cursor.is_none();
        Self {
            parameters: CheckpointParameters {
                start: self.parameters.start + 1,
                count: self.parameters.count,
                cursor: next_cursor,
            },
            cumulative_item_count: self.cumulative_item_count + items as u64,
            is_terminal,
            archive: Some(archive),
            completed_at: Some(Utc::now()),
        }
    }

    /// Same position, marked terminal. Used when an empty page is treated as
    /// the end of the listing.
    pub fn terminated(&self) -> Self {
        Self {
            parameters: self.parameters.clone(),
            cumulative_item_count: self.cumulative_item_count,
            is_terminal: true,
            archive: None,
            completed_at: Some(Utc::now()),
        }
    }
}

/// Progress of one category: the current checkpoint plus every checkpoint
/// that preceded it, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    #[serde(alias = "LastCheckpoint")]
    current: Checkpoint,
    #[serde(alias = "CheckpointHistory")]
    history: Vec<Checkpoint>,
}

impl CheckpointRecord {
    pub fn new(page_size: u32) -> Self {
        let initial = Checkpoint::initial(page_size);
        Self {
            current: initial.clone(),
            history: vec![initial],
        }
    }

    pub fn current(&self) -> &Checkpoint {
        &self.current
    }

    pub fn history(&self) -> &[Checkpoint] {
        &self.history
    }

    /// Append `next` to the history and make it current.
    pub fn push(&mut self, next: Checkpoint) {
        self.history.push(next.clone());
        self.current = next;
    }

    /// Archives recorded across the history, oldest first.
    pub fn archives(&self) -> impl Iterator<Item = &ArchiveRecord> {
        self.history.iter().filter_map(|c| c.archive.as_ref())
    }
}
