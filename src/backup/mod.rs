//! Backup engine: one pipeline per category, all running concurrently.
//!
//! Pipelines never cancel each other. A failing category is reported after
//! every other category has settled, and its checkpoint still points at the
//! page that failed so the next run resumes there.

pub mod archive;
pub mod error;
pub mod pipeline;

use std::collections::BTreeSet;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub use self::error::BackupError;
pub use self::pipeline::{
    CategoryOutcome, CategoryPipeline, PipelineContext, PipelineOptions, StopReason,
};
use crate::systemd::SystemdNotifier;
use crate::types::Category;

/// Result of one backup run across all configured categories.
#[derive(Debug, Default)]
pub struct BackupReport {
    pub outcomes: Vec<CategoryOutcome>,
    pub failures: Vec<(Category, BackupError)>,
}

impl BackupReport {
    /// True when every category finished without error or interruption.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
            && self
                .outcomes
                .iter()
                .all(|o| o.stop != StopReason::Interrupted)
    }
}

pub struct BackupOrchestrator {
    context: PipelineContext,
    copy_dir: PathBuf,
    categories: Vec<Category>,
    no_progress_bar: bool,
    notifier: SystemdNotifier,
}

impl BackupOrchestrator {
    pub fn new(
        context: PipelineContext,
        copy_dir: impl Into<PathBuf>,
        categories: Vec<Category>,
        no_progress_bar: bool,
        notifier: SystemdNotifier,
    ) -> Self {
        Self {
            context,
            copy_dir: copy_dir.into(),
            categories,
            no_progress_bar,
            notifier,
        }
    }

    /// Run every category to completion or failure and collect the results.
    ///
    /// Each pipeline is its own task, so a panic in one category is reported
    /// as that category's failure while the others carry on.
    pub async fn run(&self, shutdown: &CancellationToken) -> BackupReport {
        let started = Instant::now();
        let multi = create_multi_progress(self.no_progress_bar);

        let mut running = JoinSet::new();
        for &category in &self.categories {
            let pipeline = CategoryPipeline::new(
                category,
                self.context.clone(),
                category_dir(&self.copy_dir, category),
                multi.add(create_progress_bar(category)),
            );
            let shutdown = shutdown.clone();
            running.spawn(async move { (category, pipeline.run(&shutdown).await) });
        }

        let mut pending: BTreeSet<Category> = self.categories.iter().copied().collect();
        let mut report = BackupReport::default();
        while let Some(joined) = running.join_next().await {
            let (category, result) = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    multi.suspend(|| tracing::error!(error = %e, "Backup task ended abnormally"));
                    continue;
                }
            };
            pending.remove(&category);
            match result {
                Ok(outcome) => {
                    self.notifier.notify_status(&format!(
                        "{}: {} items archived",
                        category, outcome.total_items
                    ));
                    report.outcomes.push(outcome);
                }
                Err(e) => {
                    multi.suspend(|| tracing::error!(%category, "Backup failed: {}", e));
                    self.notifier
                        .notify_status(&format!("{}: failed", category));
                    report.failures.push((category, e));
                }
            }
        }
        // Categories that never reported back are the ones whose task died.
        for category in pending {
            self.notifier
                .notify_status(&format!("{}: failed", category));
            report.failures.push((category, BackupError::Aborted));
        }
        let _ = multi.clear();

        log_summary(&report, started.elapsed());
        report
    }
}

/// `Copy/{Documents,Photos,Audio}` under the backup directory.
pub fn category_dir(copy_dir: &Path, category: Category) -> PathBuf {
    copy_dir.join(category.directory_name())
}

/// Hidden when the user passed `--no-progress-bar` or stdout is not a TTY,
/// so cron and journald output stays clean.
fn create_multi_progress(no_progress_bar: bool) -> MultiProgress {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
    }
    MultiProgress::new()
}

fn create_progress_bar(category: Category) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {prefix:<20} {msg}") {
        pb.set_style(style);
    }
    pb.set_prefix(category.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn log_summary(report: &BackupReport, elapsed: Duration) {
    tracing::info!("── Summary ──");
    let mut outcomes: Vec<&CategoryOutcome> = report.outcomes.iter().collect();
    outcomes.sort_by_key(|o| o.category);
    for o in outcomes {
        let state = match o.stop {
            StopReason::Terminal => "complete",
            StopReason::EmptyPage => "stopped on empty page",
            StopReason::Interrupted => "interrupted",
        };
        tracing::info!(
            "  {}: {} pages, {} items, {} this run; {} items total ({})",
            o.category,
            o.pages,
            o.items,
            HumanBytes(o.bytes),
            o.total_items,
            state
        );
    }
    for (category, e) in &report.failures {
        tracing::info!("  {}: failed: {}", category, e);
    }
    tracing::info!("  elapsed: {}", format_duration(elapsed));
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
