//! Page-by-page backup of a single category.

use std::path::PathBuf;
use std::sync::Arc;

use indicatif::{HumanBytes, ProgressBar};
use tokio_util::sync::CancellationToken;

use super::archive::{archive_file_name, write_archive};
use super::error::{ArchiveError, BackupError};
use crate::auth::CredentialManager;
use crate::checkpoint::{CheckpointRecord, CheckpointStore};
use crate::cloud::{GatewayError, RemoteFile, RemoteGateway};
use crate::retry::{RetryAction, RetryExecutor};
use crate::types::Category;

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    /// Persist a terminal checkpoint when a page comes back empty instead
    /// of stopping with the checkpoint unchanged.
    pub mark_empty_page_terminal: bool,
}

/// Why a pipeline stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The checkpoint is terminal; the listing has been fully archived.
    Terminal,
    /// The remote listing returned no items.
    EmptyPage,
    /// Shutdown was requested; stopped at a page boundary.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryOutcome {
    pub category: Category,
    pub stop: StopReason,
    /// Pages archived during this run.
    pub pages: u32,
    /// Items archived during this run.
    pub items: u64,
    pub bytes: u64,
    /// Items archived across all runs.
    pub total_items: u64,
}

/// Everything a pipeline needs, shared across categories.
#[derive(Clone)]
pub struct PipelineContext {
    pub gateway: Arc<dyn RemoteGateway>,
    pub credentials: Arc<CredentialManager>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub executor: RetryExecutor,
    pub options: PipelineOptions,
}

pub struct CategoryPipeline {
    category: Category,
    context: PipelineContext,
    output_dir: PathBuf,
    progress: ProgressBar,
}

fn classify_gateway(e: &GatewayError) -> RetryAction {
    if e.is_retryable() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

fn classify_archive(e: &ArchiveError) -> RetryAction {
    if e.is_retryable() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

impl CategoryPipeline {
    pub fn new(
        category: Category,
        context: PipelineContext,
        output_dir: PathBuf,
        progress: ProgressBar,
    ) -> Self {
        Self {
            category,
            context,
            output_dir,
            progress,
        }
    }

    /// Archive pages until the listing is exhausted, a page comes back
    /// empty, or `shutdown` fires between pages.
    ///
    /// Each page is listed, packaged, written and checkpointed before the
    /// next one is requested. On error the stored checkpoint still points at
    /// the failed page.
    pub async fn run(&self, shutdown: &CancellationToken) -> Result<CategoryOutcome, BackupError> {
        let category = self.category;
        let ctx = &self.context;

        let mut record = ctx.checkpoints.load(category).await?;
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| BackupError::OutputDir {
                path: self.output_dir.clone(),
                source,
            })?;

        let mut outcome = CategoryOutcome {
            category,
            stop: StopReason::Terminal,
            pages: 0,
            items: 0,
            bytes: 0,
            total_items: record.current().cumulative_item_count,
        };

        loop {
            if record.current().is_terminal {
                outcome.stop = StopReason::Terminal;
                break;
            }
            if shutdown.is_cancelled() {
                self.progress
                    .suspend(|| tracing::info!(%category, "Shutdown requested, stopping before next page"));
                outcome.stop = StopReason::Interrupted;
                break;
            }

            let checkpoint = record.current().clone();
            let start = checkpoint.parameters.start;
            self.progress.set_prefix(format!("{} page {}", category, start));

            let credential = ctx.credentials.get_credential().await?;
            let gateway = &ctx.gateway;
            let params = &checkpoint.parameters;
            let token = credential.as_str();
            let page = ctx
                .executor
                .run(&format!("{} listing", category), classify_gateway, move || {
                    gateway.list_page(category, params, token)
                })
                .await
                .map_err(|source| BackupError::Listing { start, source })?;

            if page.items.is_empty() {
                self.finish_on_empty_page(&mut record).await?;
                outcome.stop = StopReason::EmptyPage;
                break;
            }

            let items = page.items.len();
            let (first, last) = checkpoint.archive_range(items);
            let file_ids: Vec<String> = page.items.iter().map(RemoteFile::identifier).collect();
            let path = self.output_dir.join(archive_file_name(first, last));
            tracing::debug!(%category, start, items, "Packaging {}", path.display());

            let ids = file_ids.as_slice();
            let path_ref = path.as_path();
            let progress = &self.progress;
            let archive = ctx
                .executor
                .run(&format!("{} archive", category), classify_archive, move || async move {
                    let stream = gateway.package_archive(ids, token).await?;
                    write_archive(stream, path_ref, progress).await
                })
                .await
                .map_err(|source| BackupError::Archive {
                    first,
                    last,
                    source,
                })?;

            outcome.pages += 1;
            outcome.items += items as u64;
            outcome.bytes += archive.bytes;

            let next = checkpoint.advance(items, page.next_cursor, archive);
            record.push(next);
            ctx.checkpoints.save(category, &record).await?;
            outcome.total_items = record.current().cumulative_item_count;

            self.progress.set_message(format!(
                "{} items, {}",
                outcome.total_items,
                HumanBytes(outcome.bytes)
            ));
            self.progress.suspend(|| {
                tracing::info!(
                    %category,
                    start,
                    items,
                    total = outcome.total_items,
                    terminal = record.current().is_terminal,
                    "Archived {}",
                    path.display()
                )
            });
        }

        self.progress.finish_and_clear();
        Ok(outcome)
    }

    async fn finish_on_empty_page(&self, record: &mut CheckpointRecord) -> Result<(), BackupError> {
        let category = self.category;
        let start = record.current().parameters.start;
        if self.context.options.mark_empty_page_terminal {
            let done = record.current().terminated();
            record.push(done);
            self.context.checkpoints.save(category, record).await?;
            self.progress
                .suspend(|| tracing::info!(%category, start, "Empty page, marked category complete"));
        } else {
            self.progress.suspend(|| {
                tracing::warn!(
                    %category,
                    start,
                    "Empty page on a non-terminal checkpoint; stopping without marking complete"
                )
            });
        }
        Ok(())
    }
}
