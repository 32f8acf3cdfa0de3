//! Durable per-category progress tracking.
//!
//! Each category owns one JSON record holding its current checkpoint and the
//! append-only history of earlier ones. Records are replaced atomically after
//! every archived page, so a restart resumes at the first page that was not
//! fully written.

pub mod error;
pub mod lock;
pub mod store;
pub mod types;

pub use error::CheckpointError;
pub use lock::BackupLock;
pub use store::{CheckpointStore, JsonCheckpointStore};
pub use types::{ArchiveRecord, CheckpointParameters, CheckpointRecord, DEFAULT_PAGE_SIZE};
