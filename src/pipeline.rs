//! One sync run: checkpoint, fetch, classify, upload, reclaim.
//!
//! Phases run strictly one after another. The checkpoint is saved right
//! after a complete fetch phase, before anything is uploaded, so an
//! interrupted upload leaves its groups on disk for the next run without
//! refetching them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{format_timestamp, CheckpointStore};
use crate::classify::{classify, ClassifyError};
use crate::dest::DestinationClient;
use crate::fetch::{FetchConfig, FetchPlanner, FetchReport};
use crate::retry::RetryConfig;
use crate::routing::RoutingTable;
use crate::source::SourceClient;
use crate::staging::StagingArea;
use crate::state::{StateDb, SyncRunStats};
use crate::upload::{RunLedger, TransferConfig, TransferExecutor, TransferReport};

/// Everything a run talks to, built once at startup.
pub struct SyncContext {
    /// Absent when the fetch phase is skipped.
    pub source: Option<Arc<dyn SourceClient>>,
    pub destination: Arc<dyn DestinationClient>,
    pub routing: RoutingTable,
    pub staging: StagingArea,
    pub checkpoint: CheckpointStore,
    pub ledger: Option<Arc<dyn StateDb>>,
}

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub retry: RetryConfig,
    pub video_pause: Duration,
    pub dry_run: bool,
    pub skip_fetch: bool,
    pub no_progress_bar: bool,
}

#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub fetch: Option<FetchReport>,
    /// The checkpoint written by this run, if any.
    pub checkpoint_saved: Option<DateTime<Utc>>,
    pub classify_errors: Vec<ClassifyError>,
    pub transfer: Option<TransferReport>,
    pub interrupted: bool,
}

impl SyncOutcome {
    /// No halted queue and no configuration error.
    pub fn is_success(&self) -> bool {
        self.classify_errors.is_empty()
            && !self.transfer.as_ref().is_some_and(TransferReport::halted)
    }

    fn stats(&self) -> SyncRunStats {
        let mut stats = SyncRunStats {
            config_errors: self.classify_errors.len() as u64,
            interrupted: self.interrupted,
            ..Default::default()
        };
        if let Some(fetch) = &self.fetch {
            stats.groups_staged = fetch.staged.len() as u64;
            stats.profiles_failed = fetch.failed_profiles.len() as u64;
        }
        if let Some(transfer) = &self.transfer {
            stats.images_uploaded = transfer.images.uploaded;
            stats.videos_uploaded = transfer.videos.uploaded;
            stats.uploads_failed =
                u64::from(transfer.images.halted) + u64::from(transfer.videos.halted);
            stats.groups_reclaimed = transfer.reclaimed.len() as u64;
        }
        stats
    }
}

async fn start_ledger_run(
    ledger: Option<&Arc<dyn StateDb>>,
    checkpoint: Option<DateTime<Utc>>,
) -> Option<(Arc<dyn StateDb>, i64)> {
    let db = ledger?;
    match db.start_sync_run(checkpoint).await {
        Ok(run_id) => Some((Arc::clone(db), run_id)),
        Err(e) => {
            tracing::warn!("Ledger unavailable for this run: {}", e);
            None
        }
    }
}

async fn finish_ledger_run(run: &Option<(Arc<dyn StateDb>, i64)>, outcome: &SyncOutcome) {
    if let Some((db, run_id)) = run {
        if let Err(e) = db.complete_sync_run(*run_id, &outcome.stats()).await {
            tracing::warn!("Failed to record sync run: {}", e);
        }
    }
}

/// Run the whole pipeline once.
pub async fn run_sync(
    ctx: &SyncContext,
    options: &SyncOptions,
    shutdown: CancellationToken,
) -> anyhow::Result<SyncOutcome> {
    let run_start = Utc::now();
    let _lock = ctx.staging.lock().await?;
    let mut outcome = SyncOutcome::default();

    let checkpoint = if options.skip_fetch {
        None
    } else if options.dry_run {
        Some(ctx.checkpoint.peek().await?.unwrap_or(run_start))
    } else {
        Some(ctx.checkpoint.load_or_init(run_start).await?)
    };

    let ledger_run = if options.dry_run {
        None
    } else {
        start_ledger_run(ctx.ledger.as_ref(), checkpoint).await
    };

    if let Some(checkpoint) = checkpoint {
        let source = ctx
            .source
            .as_deref()
            .context("fetch phase needs a source client")?;
        let planner = FetchPlanner::new(
            source,
            &ctx.routing,
            &ctx.staging,
            FetchConfig {
                retry: options.retry,
                dry_run: options.dry_run,
            },
            shutdown.clone(),
        );
        let report = planner.run(checkpoint).await?;
        let complete = report.is_complete();
        tracing::info!(
            staged = report.staged.len(),
            failed_profiles = report.failed_profiles.len(),
            "Fetch phase {}",
            if complete { "complete" } else { "interrupted" }
        );
        outcome.fetch = Some(report);

        if !complete {
            outcome.interrupted = true;
            finish_ledger_run(&ledger_run, &outcome).await;
            return Ok(outcome);
        }
        if !options.dry_run {
            ctx.checkpoint.save(run_start).await?;
            outcome.checkpoint_saved = Some(run_start);
            tracing::info!("Checkpoint advanced to {}", format_timestamp(&run_start));
            if let Some((db, run_id)) = &ledger_run {
                if let Err(e) = db.mark_fetch_complete(*run_id).await {
                    tracing::warn!("Failed to record fetch completion: {}", e);
                }
            }
        }
    }

    if shutdown.is_cancelled() {
        outcome.interrupted = true;
        finish_ledger_run(&ledger_run, &outcome).await;
        return Ok(outcome);
    }

    let classification = classify(&ctx.staging, &ctx.routing).await?;
    for error in &classification.errors {
        tracing::error!("{}", error);
    }
    outcome.classify_errors = classification.errors;

    let ledger = ledger_run.as_ref().map(|(db, run_id)| RunLedger {
        db: db.as_ref(),
        run_id: *run_id,
    });
    let executor = TransferExecutor::new(
        ctx.destination.as_ref(),
        &ctx.staging,
        ledger,
        TransferConfig {
            retry: options.retry,
            video_pause: options.video_pause,
            dry_run: options.dry_run,
            no_progress_bar: options.no_progress_bar,
        },
        shutdown,
    );
    let transfer = executor.run(&classification.queues).await?;
    outcome.interrupted |= transfer.interrupted;
    outcome.transfer = Some(transfer);

    finish_ledger_run(&ledger_run, &outcome).await;
    Ok(outcome)
}
