use clap::{Args, Parser, Subcommand};

use crate::types::{Category, LogLevel};

/// One day.
pub const MAX_ARCHIVE_TIMEOUT_MINS: u64 = 24 * 60;

#[derive(Parser, Debug)]
#[command(
    name = "btcloud-backup",
    version,
    about = "Resumable backup of BT Cloud documents, photos and audio into zip archives",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Arguments for the implicit `backup` command
    #[command(flatten)]
    pub backup: BackupArgs,

    /// Log level (RUST_LOG takes precedence when set)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Back up every configured category (default)
    Backup(BackupArgs),

    /// Show each category's stored progress
    Status {
        /// Backup directory (the one holding Copy/)
        directory: String,
    },

    /// Check that every recorded archive is present and intact
    Verify {
        /// Backup directory (the one holding Copy/)
        directory: String,

        /// Re-hash each archive and compare SHA-256 digests
        #[arg(long)]
        checksums: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct BackupArgs {
    /// Backup directory; archives and progress go under DIRECTORY/Copy
    /// (prompted for when omitted)
    pub directory: Option<String>,

    /// Account identifier used in API paths
    #[arg(long, env = "BTCLOUD_USER_ID")]
    pub user_id: Option<String>,

    /// Device repository to include in listings (repeatable)
    #[arg(long = "repository", env = "BTCLOUD_REPOSITORIES", value_delimiter = ',')]
    pub repositories: Vec<String>,

    /// Service base URL
    #[arg(long, default_value = "https://btcloud.bt.com")]
    pub base_url: String,

    /// Category to back up (repeatable; default: all)
    #[arg(long = "category", value_enum)]
    pub categories: Vec<Category>,

    /// Items requested per page for categories without stored progress
    #[arg(long, default_value_t = crate::checkpoint::DEFAULT_PAGE_SIZE, value_parser = clap::value_parser!(u32).range(1..))]
    pub page_size: u32,

    /// Total attempts per remote call, including the first
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: u32,

    /// Base retry delay in seconds
    #[arg(long, default_value_t = 2)]
    pub retry_delay: u64,

    /// Upper bound on a single retry delay in seconds
    #[arg(long, default_value_t = 30)]
    pub max_retry_delay: u64,

    /// Seconds an issued token is used before it is refreshed
    #[arg(long, default_value_t = crate::auth::DEFAULT_LEASE.as_secs(), value_parser = clap::value_parser!(u64).range(1..=crate::auth::MAX_LEASE.as_secs()))]
    pub token_lease_secs: u64,

    /// Minutes to wait for the server to start sending a page's zip
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..=MAX_ARCHIVE_TIMEOUT_MINS))]
    pub archive_timeout_mins: u64,

    /// Treat an empty page as the end of a category and record it as complete
    #[arg(long)]
    pub mark_empty_page_terminal: bool,

    /// Disable progress bars
    #[arg(long)]
    pub no_progress_bar: bool,

    /// Send sd_notify READY/STATUS/STOPPING messages
    #[arg(long)]
    pub notify_systemd: bool,

    /// Seed token, replacing any stored one.
    /// WARNING: passing via --token is visible in process listings.
    /// Prefer the BTCLOUD_TOKEN environment variable instead.
    #[arg(long, env = "BTCLOUD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

impl Cli {
    /// The subcommand to run, falling back to `backup` with the top-level
    /// arguments when none was given.
    pub fn effective_command(self) -> Command {
        match self.command {
            Some(command) => command,
            None => Command::Backup(self.backup),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["btcloud-backup"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_no_subcommand_is_backup() {
        let cli = parse(&["/backups", "--user-id", "u1", "--repository", "TABLET"]);
        match cli.effective_command() {
            Command::Backup(args) => {
                assert_eq!(args.directory.as_deref(), Some("/backups"));
                assert_eq!(args.user_id.as_deref(), Some("u1"));
                assert_eq!(args.repositories, vec!["TABLET"]);
            }
            other => panic!("expected backup, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.log_level, LogLevel::Info);
        let Command::Backup(args) = cli.effective_command() else {
            panic!("expected backup");
        };
        assert_eq!(args.page_size, 500);
        assert_eq!(args.max_attempts, 10);
        assert_eq!(args.retry_delay, 2);
        assert_eq!(args.max_retry_delay, 30);
        assert_eq!(args.token_lease_secs, 600);
        assert_eq!(args.archive_timeout_mins, 30);
        assert_eq!(args.base_url, "https://btcloud.bt.com");
        assert!(args.categories.is_empty());
        assert!(!args.mark_empty_page_terminal);
    }

    #[test]
    fn test_duration_options_bounded() {
        let full = |extra: &[&str]| {
            let mut argv = vec!["btcloud-backup", "backup", "/backups"];
            argv.extend_from_slice(extra);
            Cli::try_parse_from(argv)
        };
        assert!(full(&["--token-lease-secs", "86400"]).is_ok());
        assert!(full(&["--token-lease-secs", "86401"]).is_err());
        assert!(full(&["--token-lease-secs", "18446744073709551615"]).is_err());
        assert!(full(&["--archive-timeout-mins", "1440"]).is_ok());
        assert!(full(&["--archive-timeout-mins", "1441"]).is_err());
    }

    #[test]
    fn test_repeatable_options() {
        let cli = parse(&[
            "backup",
            "--repository",
            "TABLET",
            "--repository",
            "SyncDrive,DESKTOP",
            "--category",
            "photos",
            "--category",
            "audio",
        ]);
        let Command::Backup(args) = cli.effective_command() else {
            panic!("expected backup");
        };
        assert_eq!(args.repositories, vec!["TABLET", "SyncDrive", "DESKTOP"]);
        assert_eq!(args.categories, vec![Category::Photos, Category::Audio]);
    }

    #[test]
    fn test_status_subcommand() {
        let cli = parse(&["status", "/backups", "--log-level", "warn"]);
        assert_eq!(cli.log_level, LogLevel::Warn);
        assert!(matches!(
            cli.effective_command(),
            Command::Status { directory } if directory == "/backups"
        ));
    }

    #[test]
    fn test_verify_subcommand() {
        let cli = parse(&["verify", "/backups", "--checksums"]);
        assert!(matches!(
            cli.effective_command(),
            Command::Verify { checksums: true, .. }
        ));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        assert!(Cli::try_parse_from(["btcloud-backup", "--page-size", "0"]).is_err());
    }
}
