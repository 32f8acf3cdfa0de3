use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use url::Url;

use crate::cli::{BackupArgs, MAX_ARCHIVE_TIMEOUT_MINS};
use crate::retry::RetryConfig;
use crate::types::Category;

/// Name of the working directory created under the backup directory. It
/// holds the category output folders, checkpoints and the token file.
pub const COPY_DIR_NAME: &str = "Copy";
pub const TOKEN_FILE_NAME: &str = "token.txt";

/// Timeout for listing and token calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings for one backup run, validated from [`BackupArgs`].
pub struct Config {
    pub directory: PathBuf,
    pub base_url: Url,
    pub user_id: String,
    pub repositories: Vec<String>,
    pub categories: Vec<Category>,
    pub token: Option<String>,

    pub retry: RetryConfig,
    pub token_lease: Duration,
    pub request_timeout: Duration,
    pub archive_timeout: Duration,

    pub page_size: u32,

    pub mark_empty_page_terminal: bool,
    pub no_progress_bar: bool,
    pub notify_systemd: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("directory", &self.directory)
            .field("base_url", &self.base_url.as_str())
            .field("user_id", &self.user_id)
            .field("repositories", &self.repositories)
            .field("categories", &self.categories)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// `DIRECTORY/Copy`, where everything the tool writes lives.
pub fn copy_dir(directory: &Path) -> PathBuf {
    directory.join(COPY_DIR_NAME)
}

impl Config {
    /// Build the run configuration. `directory` is the already resolved
    /// backup directory (from the argument or the prompt).
    pub fn from_args(args: BackupArgs, directory: &str) -> anyhow::Result<Self> {
        let user_id = args
            .user_id
            .filter(|u| !u.trim().is_empty())
            .context("--user-id (or BTCLOUD_USER_ID) is required")?;

        let repositories: Vec<String> = args
            .repositories
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if repositories.is_empty() {
            anyhow::bail!("at least one --repository (or BTCLOUD_REPOSITORIES) is required");
        }

        let base_url = Url::parse(&args.base_url)
            .with_context(|| format!("invalid --base-url '{}'", args.base_url))?;

        let mut categories = if args.categories.is_empty() {
            Category::ALL.to_vec()
        } else {
            args.categories
        };
        categories.sort();
        categories.dedup();

        if args.retry_delay > args.max_retry_delay {
            anyhow::bail!(
                "--retry-delay ({}s) must not exceed --max-retry-delay ({}s)",
                args.retry_delay,
                args.max_retry_delay
            );
        }

        Ok(Self {
            directory: expand_tilde(directory),
            base_url,
            user_id: user_id.trim().to_string(),
            repositories,
            categories,
            token: args.token,
            retry: RetryConfig {
                max_attempts: args.max_attempts,
                base_delay: Duration::from_secs(args.retry_delay),
                max_delay: Duration::from_secs(args.max_retry_delay),
            },
            token_lease: Duration::from_secs(args.token_lease_secs).min(crate::auth::MAX_LEASE),
            request_timeout: REQUEST_TIMEOUT,
            archive_timeout: Duration::from_secs(
                args.archive_timeout_mins
                    .min(MAX_ARCHIVE_TIMEOUT_MINS)
                    .saturating_mul(60),
            ),
            page_size: args.page_size,
            mark_empty_page_terminal: args.mark_empty_page_terminal,
            no_progress_bar: args.no_progress_bar,
            notify_systemd: args.notify_systemd,
        })
    }

    pub fn copy_dir(&self) -> PathBuf {
        copy_dir(&self.directory)
    }

    pub fn token_path(&self) -> PathBuf {
        self.copy_dir().join(TOKEN_FILE_NAME)
    }
}
