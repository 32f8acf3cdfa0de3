use serde::Deserialize;

use super::{ListedPage, RemoteFile};

/// Body of a `browse/{segment}` listing call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseResponse {
    pub files_holder: FilesHolder,
}

#[derive(Debug, Deserialize)]
pub struct FilesHolder {
    #[serde(default)]
    pub files: Files,
    #[serde(default)]
    pub cursor: Option<TextValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Files {
    #[serde(default)]
    pub file: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: TextValue,
    pub parent_path: TextValue,
    pub repository: TextValue,
}

/// The service wraps scalar values as `{"$": "..."}`.
#[derive(Debug, Deserialize)]
pub struct TextValue {
    #[serde(rename = "$")]
    pub value: String,
}

impl From<BrowseResponse> for ListedPage {
    fn from(resp: BrowseResponse) -> Self {
        let holder = resp.files_holder;
        ListedPage {
            items: holder
                .files
                .file
                .into_iter()
                .map(|f| RemoteFile {
                    repository: f.repository.value,
                    parent_path: f.parent_path.value,
                    name: f.name.value,
                })
                .collect(),
            next_cursor: holder.cursor.map(|c| c.value),
        }
    }
}
