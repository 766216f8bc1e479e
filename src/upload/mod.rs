//! Transfer executor: drain the image queue, then the video queue.
//!
//! Every successful upload is written to the ledger and its local file is
//! deleted, which is what makes a re-run skip it. A failed item halts its
//! queue; the other queue still runs. Groups left without media are
//! reclaimed at the end.

use std::io::IsTerminal;
use std::time::Duration;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::classify::{UploadQueues, WorkItem};
use crate::dest::{DestinationClient, UploadError, UploadRef};
use crate::retry::{retry_remote, RetryConfig};
use crate::staging::{MediaType, StagedGroup, StagingArea, StagingError};
use crate::state::{StateDb, UploadRecord};

#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    pub retry: RetryConfig,
    /// Pause between consecutive video uploads.
    pub video_pause: Duration,
    pub dry_run: bool,
    pub no_progress_bar: bool,
}

/// Ledger handle for the current run.
#[derive(Clone, Copy)]
pub struct RunLedger<'a> {
    pub db: &'a dyn StateDb,
    pub run_id: i64,
}

#[derive(Debug, Default)]
pub struct QueueOutcome {
    pub uploaded: u64,
    /// The queue stopped on a failed item.
    pub halted: bool,
}

#[derive(Debug, Default)]
pub struct TransferReport {
    pub images: QueueOutcome,
    pub videos: QueueOutcome,
    pub reclaimed: Vec<StagedGroup>,
    /// Items that would have been uploaded (dry run only).
    pub planned: usize,
    pub interrupted: bool,
}

impl TransferReport {
    pub fn halted(&self) -> bool {
        self.images.halted || self.videos.halted
    }
}

/// Hidden when `--no-progress-bar` is set or stdout is not a TTY.
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

pub struct TransferExecutor<'a> {
    destination: &'a dyn DestinationClient,
    staging: &'a StagingArea,
    ledger: Option<RunLedger<'a>>,
    config: TransferConfig,
    shutdown: CancellationToken,
}

impl<'a> TransferExecutor<'a> {
    pub fn new(
        destination: &'a dyn DestinationClient,
        staging: &'a StagingArea,
        ledger: Option<RunLedger<'a>>,
        config: TransferConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            destination,
            staging,
            ledger,
            config,
            shutdown,
        }
    }

    pub async fn run(&self, queues: &UploadQueues) -> Result<TransferReport, StagingError> {
        let mut report = TransferReport::default();

        if self.config.dry_run {
            for item in queues.images.iter().chain(&queues.videos) {
                tracing::info!(
                    "[DRY RUN] Would upload {} to album {}",
                    item.path.display(),
                    item.album
                );
            }
            report.planned = queues.images.len() + queues.videos.len();
            return Ok(report);
        }

        let total = (queues.images.len() + queues.videos.len()) as u64;
        let pb = create_progress_bar(self.config.no_progress_bar, total);

        report.images = self.drain(&queues.images, &pb, &mut report.interrupted).await?;
        if !report.interrupted {
            report.videos = self.drain(&queues.videos, &pb, &mut report.interrupted).await?;
        }
        pb.finish_and_clear();

        report.reclaimed = self.staging.reclaim_empty_groups().await?;
        if !report.reclaimed.is_empty() {
            tracing::info!("Reclaimed {} empty staged group(s)", report.reclaimed.len());
        }
        Ok(report)
    }

    /// Upload one queue in order until it is empty, an item fails, or
    /// shutdown is requested.
    async fn drain(
        &self,
        queue: &[WorkItem],
        pb: &ProgressBar,
        interrupted: &mut bool,
    ) -> Result<QueueOutcome, StagingError> {
        let mut outcome = QueueOutcome::default();
        for (i, item) in queue.iter().enumerate() {
            if self.shutdown.is_cancelled() {
                pb.suspend(|| tracing::info!("Shutdown requested, stopping uploads"));
                *interrupted = true;
                break;
            }
            if item.media_type == MediaType::Video && i > 0 && !self.config.video_pause.is_zero() {
                tokio::time::sleep(self.config.video_pause).await;
            }

            let file_name = item.file_name();
            pb.set_message(file_name.clone());
            match self.upload(item).await {
                Ok(upload_ref) => {
                    self.record(item, &file_name, &upload_ref).await;
                    tokio::fs::remove_file(&item.path)
                        .await
                        .map_err(|e| StagingError::io(&item.path, e))?;
                    pb.suspend(|| {
                        tracing::info!(group = %item.group, "Uploaded {}: {}", file_name, upload_ref)
                    });
                    outcome.uploaded += 1;
                    pb.inc(1);
                }
                Err(e) => {
                    pb.suspend(|| {
                        tracing::error!(
                            group = %item.group,
                            "Upload of {} failed, halting {} queue: {}",
                            item.path.display(),
                            item.media_type,
                            e
                        )
                    });
                    outcome.halted = true;
                    break;
                }
            }
        }
        Ok(outcome)
    }

    async fn upload(&self, item: &WorkItem) -> Result<UploadRef, UploadError> {
        let label = format!("Uploading {}", item.path.display());
        let description = item.description.as_deref();
        match item.media_type {
            MediaType::Image => {
                retry_remote(&self.config.retry, &label, || {
                    self.destination
                        .upload_photo(&item.path, description, item.album)
                })
                .await
            }
            MediaType::Video => {
                let name = item.video_name.as_deref().unwrap_or_default();
                retry_remote(&self.config.retry, &label, || {
                    self.destination
                        .upload_video(&item.path, name, description, item.album)
                })
                .await
            }
        }
    }

    /// The ledger is observational; a write failure is logged, not fatal.
    async fn record(&self, item: &WorkItem, file_name: &str, upload_ref: &UploadRef) {
        let Some(ledger) = self.ledger else {
            return;
        };
        let record = UploadRecord {
            run_id: ledger.run_id,
            owner: item.group.owner().to_string(),
            ordinal: item.group.ordinal(),
            kind: item.group.kind(),
            media_type: item.media_type,
            file_name: file_name.to_string(),
            url: upload_ref.url(),
            uploaded_at: Utc::now(),
        };
        if let Err(e) = ledger.db.record_upload(&record).await {
            tracing::warn!("Failed to record upload of {} in ledger: {}", file_name, e);
        }
    }
}
