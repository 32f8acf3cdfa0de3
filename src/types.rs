use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// A remote file category. Each one is backed up by its own pipeline with
/// its own checkpoint file and output directory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Documents,
    Photos,
    Audio,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Documents, Category::Photos, Category::Audio];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Documents => "documents",
            Category::Photos => "photos",
            Category::Audio => "audio",
        }
    }

    /// Path segment of the remote browse endpoint.
    pub fn listing_segment(&self) -> &'static str {
        match self {
            Category::Documents => "document",
            Category::Photos => "imagevideo",
            Category::Audio => "audio",
        }
    }

    /// Subdirectory (under the copy directory) that receives the archives.
    pub fn directory_name(&self) -> &'static str {
        match self {
            Category::Documents => "Documents",
            Category::Photos => "Photos",
            Category::Audio => "Audio",
        }
    }

    /// File name of the category's checkpoint record. These match the names
    /// used by earlier releases so existing progress is picked up.
    pub fn checkpoint_file_name(&self) -> &'static str {
        match self {
            Category::Documents => "documentCheckpoint.json",
            Category::Photos => "photosVideosCheckpoint.json",
            Category::Audio => "audioCheckpoint.json",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_names_are_distinct() {
        let files: std::collections::HashSet<_> =
            Category::ALL.iter().map(|c| c.checkpoint_file_name()).collect();
        let dirs: std::collections::HashSet<_> =
            Category::ALL.iter().map(|c| c.directory_name()).collect();
        assert_eq!(files.len(), 3);
        assert_eq!(dirs.len(), 3);
    }

    #[test]
    fn test_listing_segments() {
        assert_eq!(Category::Documents.listing_segment(), "document");
        assert_eq!(Category::Photos.listing_segment(), "imagevideo");
        assert_eq!(Category::Audio.listing_segment(), "audio");
    }

    #[test]
    fn test_category_serde_lowercase() {
        let json = serde_json::to_string(&Category::Photos).unwrap();
        assert_eq!(json, "\"photos\"");
        let back: Category = serde_json::from_str("\"audio\"").unwrap();
        assert_eq!(back, Category::Audio);
    }
}
