//! btcloud-backup: resumable backup of a BT Cloud account.
//!
//! Documents, photos/videos and audio are each paged through the remote
//! listing and every page is saved as one server-built zip archive. Progress
//! is checkpointed per category after each archive, so an interrupted or
//! failed run picks up at the first page that was not fully written.

#![warn(clippy::all)]

mod auth;
mod backup;
mod checkpoint;
mod cli;
mod cloud;
mod config;
pub mod retry;
mod shutdown;
mod systemd;
mod types;

use std::io::{IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use auth::{CredentialManager, FileCredentialStore};
use backup::archive::file_sha256;
use backup::{BackupOrchestrator, PipelineContext, PipelineOptions};
use checkpoint::{BackupLock, JsonCheckpointStore, DEFAULT_PAGE_SIZE};
use cli::{BackupArgs, Command};
use cloud::client::GatewayConfig;
use cloud::BtCloudClient;
use config::Config;
use retry::{RetryExecutor, TracingRetryObserver};
use systemd::SystemdNotifier;
use types::Category;

/// Ask for a line on stdin. Returns `None` when stdin is not interactive.
fn prompt_line(prompt: &str) -> Option<String> {
    if !std::io::stdin().is_terminal() {
        return None;
    }
    tokio::task::block_in_place(|| {
        print!("{}", prompt);
        std::io::stdout().flush().ok()?;
        let mut input = String::new();
        std::io::stdin().read_line(&mut input).ok()?;
        let input = input.trim().to_string();
        (!input.is_empty()).then_some(input)
    })
}

/// Ask for the seed token without echoing it.
fn prompt_token() -> Option<String> {
    if !std::io::stdin().is_terminal() {
        return None;
    }
    tokio::task::block_in_place(|| rpassword::prompt_password("BT Cloud token: ").ok())
}

/// Run the backup command.
async fn run_backup(args: BackupArgs) -> anyhow::Result<()> {
    let directory = match args.directory.clone() {
        Some(directory) => directory,
        None => prompt_line("Backup directory: ")
            .context("No backup directory given and stdin is not interactive")?,
    };
    let config = Config::from_args(args, &directory)?;
    tracing::debug!(?config, "Resolved configuration");

    let copy_dir = config.copy_dir();
    tokio::fs::create_dir_all(&copy_dir)
        .await
        .with_context(|| format!("Failed to create {}", copy_dir.display()))?;
    let lock = BackupLock::acquire(&copy_dir).await?;

    let token_store = Arc::new(FileCredentialStore::new(config.token_path()));
    tracing::debug!("Using token file {}", token_store.path().display());
    auth::ensure_seed(token_store.as_ref(), config.token.clone(), &prompt_token).await?;

    let gateway = Arc::new(BtCloudClient::new(GatewayConfig {
        base_url: config.base_url.clone(),
        user_id: config.user_id.clone(),
        repositories: config.repositories.clone(),
        request_timeout: config.request_timeout,
        archive_timeout: config.archive_timeout,
    })?);
    let executor = RetryExecutor::new(config.retry, Arc::new(TracingRetryObserver));
    tracing::debug!(
        max_attempts = executor.config().max_attempts,
        lease_secs = config.token_lease.as_secs(),
        "Retry and token settings"
    );
    let credentials = Arc::new(CredentialManager::new(
        gateway.clone(),
        token_store,
        executor.clone(),
        config.token_lease,
    ));

    // Fail once, up front, instead of once per category.
    credentials.get_credential().await?;

    let shutdown = shutdown::install_signal_handler();
    let refresher_stop = shutdown.child_token();
    let refresher = credentials.spawn_refresher(refresher_stop.clone());

    let notifier = SystemdNotifier::new(config.notify_systemd);
    let context = PipelineContext {
        gateway,
        credentials,
        checkpoints: Arc::new(JsonCheckpointStore::new(&copy_dir, config.page_size)),
        executor,
        options: PipelineOptions {
            mark_empty_page_terminal: config.mark_empty_page_terminal,
        },
    };
    let orchestrator = BackupOrchestrator::new(
        context,
        &copy_dir,
        config.categories.clone(),
        config.no_progress_bar,
        notifier,
    );

    tracing::info!(
        categories = ?config.categories,
        "Starting backup into {}",
        copy_dir.display()
    );
    notifier.notify_ready();
    let report = orchestrator.run(&shutdown).await;
    notifier.notify_stopping();

    refresher_stop.cancel();
    if let Err(e) = refresher.await {
        tracing::warn!(error = %e, "Token refresher task ended abnormally");
    }
    tracing::debug!("Releasing {}", lock.path().display());
    drop(lock);

    if !report.failures.is_empty() {
        anyhow::bail!(
            "{} of {} categories failed; rerun to resume from the last checkpoint",
            report.failures.len(),
            config.categories.len()
        );
    }
    if !report.is_success() {
        anyhow::bail!("Backup interrupted; rerun to resume from the last checkpoint");
    }
    Ok(())
}

/// Run the status command.
async fn run_status(directory: &str) -> anyhow::Result<()> {
    let copy_dir = config::copy_dir(&config::expand_tilde(directory));
    let store = JsonCheckpointStore::new(&copy_dir, DEFAULT_PAGE_SIZE);

    println!("Backup directory: {}", copy_dir.display());
    println!();
    for category in Category::ALL {
        match store.peek(category).await? {
            None => println!("{:<10} not started", category),
            Some(record) => {
                let current = record.current();
                let state = if current.is_terminal {
                    "complete"
                } else {
                    "in progress"
                };
                println!(
                    "{:<10} {}: {} items in {} archives, next page {} ({} per page)",
                    category,
                    state,
                    current.cumulative_item_count,
                    record.archives().count(),
                    current.parameters.start,
                    current.parameters.count
                );
                if let Some(completed) = record.history().iter().rev().find_map(|c| c.completed_at) {
                    println!(
                        "{:<10} last page saved {}",
                        "",
                        completed.format("%Y-%m-%d %H:%M:%S UTC")
                    );
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct VerifyCounts {
    verified: usize,
    missing: usize,
    corrupted: usize,
}

/// Check every archive recorded in `category`'s history, printing one line
/// per problem.
async fn verify_category(
    store: &JsonCheckpointStore,
    copy_dir: &Path,
    category: Category,
    checksums: bool,
) -> anyhow::Result<VerifyCounts> {
    let mut counts = VerifyCounts::default();
    let Some(record) = store.peek(category).await? else {
        return Ok(counts);
    };
    let dir = backup::category_dir(copy_dir, category);

    for archive in record.archives() {
        let path = dir.join(&archive.file_name);
        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(_) => {
                println!("MISSING: {}", path.display());
                counts.missing += 1;
                continue;
            }
        };
        if size != archive.bytes {
            println!(
                "CORRUPTED: {} ({} bytes, expected {})",
                path.display(),
                size,
                archive.bytes
            );
            counts.corrupted += 1;
            continue;
        }
        if checksums {
            match file_sha256(&path).await {
                Ok(digest) if digest.eq_ignore_ascii_case(&archive.sha256) => {}
                Ok(_) => {
                    println!("CORRUPTED: {} (checksum mismatch)", path.display());
                    counts.corrupted += 1;
                    continue;
                }
                Err(e) => {
                    println!("ERROR: {} - {}", path.display(), e);
                    counts.corrupted += 1;
                    continue;
                }
            }
        }
        counts.verified += 1;
    }
    Ok(counts)
}

/// Run the verify command.
async fn run_verify(directory: &str, checksums: bool) -> anyhow::Result<()> {
    let copy_dir = config::copy_dir(&config::expand_tilde(directory));
    let store = JsonCheckpointStore::new(&copy_dir, DEFAULT_PAGE_SIZE);

    println!("Verifying archives in {}...", copy_dir.display());
    println!();

    let mut total = VerifyCounts::default();
    for category in Category::ALL {
        let counts = verify_category(&store, &copy_dir, category, checksums).await?;
        total.verified += counts.verified;
        total.missing += counts.missing;
        total.corrupted += counts.corrupted;
    }

    println!();
    println!("Results:");
    println!("  Verified:  {}", total.verified);
    println!("  Missing:   {}", total.missing);
    println!("  Corrupted: {}", total.corrupted);

    if total.missing > 0 || total.corrupted > 0 {
        std::process::exit(1);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    match cli.effective_command() {
        Command::Backup(args) => run_backup(args).await,
        Command::Status { directory } => run_status(&directory).await,
        Command::Verify {
            directory,
            checksums,
        } => run_verify(&directory, checksums).await,
    }
}
