use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::checkpoint::store::replace_file;

/// Durable home of the bearer token between runs.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The stored token, or `None` when absent or blank.
    async fn load(&self) -> std::io::Result<Option<String>>;

    /// Replace the stored token. An empty string clears it.
    async fn save(&self, token: &str) -> std::io::Result<()>;
}

/// Plain-text token file, readable only by the owner on Unix.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> std::io::Result<Option<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn save(&self, token: &str) -> std::io::Result<()> {
        replace_file(&self.path, token.as_bytes(), true).await?;
        tracing::debug!("Saved token to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory store that also keeps every saved value.
    #[derive(Default)]
    pub(crate) struct MemoryCredentialStore {
        pub(crate) token: Mutex<Option<String>>,
        pub(crate) saves: Mutex<Vec<String>>,
    }

    impl MemoryCredentialStore {
        pub(crate) fn seeded(token: &str) -> Self {
            Self {
                token: Mutex::new(Some(token.to_string())),
                saves: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CredentialStore for MemoryCredentialStore {
        async fn load(&self) -> std::io::Result<Option<String>> {
            Ok(self
                .token
                .lock()
                .unwrap()
                .clone()
                .filter(|t| !t.trim().is_empty()))
        }

        async fn save(&self, token: &str) -> std::io::Result<()> {
            *self.token.lock().unwrap() = Some(token.to_string());
            self.saves.lock().unwrap().push(token.to_string());
            Ok(())
        }
    }

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("btcloud-backup")
            .join("credential_store_tests")
            .join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let store = FileCredentialStore::new(test_dir("missing").join("token.txt"));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_and_load_trims() {
        let dir = test_dir("save_load");
        let store = FileCredentialStore::new(dir.join("token.txt"));
        std::fs::write(store.path(), "  abc123\n").unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("abc123"));

        store.save("def456").await.unwrap();
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "def456");
        assert_eq!(store.load().await.unwrap().as_deref(), Some("def456"));
    }

    #[tokio::test]
    async fn test_cleared_token_loads_as_none() {
        let store = FileCredentialStore::new(test_dir("cleared").join("token.txt"));
        store.save("").await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_token_file_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let store = FileCredentialStore::new(test_dir("perms").join("token.txt"));
        store.save("secret").await.unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_file() {
        let dir = test_dir("no_temp");
        let store = FileCredentialStore::new(dir.join("token.txt"));
        store.save("first").await.unwrap();
        store.save("second").await.unwrap();
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "second");
        assert!(!dir.join("token.txt.tmp").exists());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_token() {
        let dir = test_dir("failed_save");
        let store = FileCredentialStore::new(dir.join("token.txt"));
        store.save("kept").await.unwrap();

        // A directory where the temp file should go makes the write fail.
        std::fs::create_dir_all(dir.join("token.txt.tmp")).unwrap();
        assert!(store.save("lost").await.is_err());
        assert_eq!(store.load().await.unwrap().as_deref(), Some("kept"));
    }
}
