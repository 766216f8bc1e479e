//! instavk-sync: incremental Instagram to VK media sync.
//!
//! Every run fetches the posts and stories published since the previous
//! run's start into a local staging area, uploads whatever is staged to the
//! configured VK albums, and deletes each file once it is uploaded. The
//! staging area and a single checkpoint timestamp are the only state that
//! matters between runs; a SQLite ledger records what happened for `status`.

#![warn(clippy::all)]

mod checkpoint;
mod classify;
mod cli;
mod config;
mod dest;
mod fetch;
mod linkcheck;
mod pipeline;
mod retry;
mod routing;
mod shutdown;
mod source;
mod staging;
mod state;
#[cfg(test)]
mod testing;
mod types;
mod upload;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use checkpoint::{format_timestamp, CheckpointStore};
use cli::Command;
use config::{Config, Paths};
use pipeline::{SyncContext, SyncOptions, SyncOutcome};
use routing::RoutingTable;
use staging::StagingArea;
use state::StateDb;

const RECENT_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Open the ledger, or continue without it.
async fn open_ledger(paths: &Paths) -> Option<Arc<dyn StateDb>> {
    let db_path = paths.ledger();
    match state::SqliteStateDb::open(&db_path).await {
        Ok(db) => {
            tracing::debug!("Ledger opened at {}", db_path.display());
            Some(Arc::new(db) as Arc<dyn StateDb>)
        }
        Err(e) => {
            tracing::warn!(
                "Failed to open ledger at {}: {}. Continuing without it.",
                db_path.display(),
                e
            );
            None
        }
    }
}

/// Run the sync command.
async fn run_sync(args: cli::SyncArgs) -> anyhow::Result<()> {
    let config = Config::from_args(args)?;
    tracing::debug!(?config, "Starting instavk-sync");

    let routing = RoutingTable::load(&config.paths.routes)?;
    if routing.is_empty() {
        tracing::warn!(
            "Routing file {} lists no profiles",
            config.paths.routes.display()
        );
    }

    let source: Option<Arc<dyn source::SourceClient>> = match &config.instagram_session {
        Some(session) if !config.skip_fetch => Some(Arc::new(source::InstagramClient::new(
            session,
            config.request_timeout,
        )?)),
        _ => None,
    };
    let destination = Arc::new(dest::VkClient::new(
        &config.vk_token,
        config.request_timeout,
        config.retry,
    )?);

    let ledger = if config.dry_run {
        None
    } else {
        open_ledger(&config.paths).await
    };

    let ctx = SyncContext {
        source,
        destination,
        routing,
        staging: StagingArea::new(config.staging_dir()),
        checkpoint: CheckpointStore::new(config.paths.checkpoint()),
        ledger,
    };
    let options = SyncOptions {
        retry: config.retry,
        video_pause: config.video_pause,
        dry_run: config.dry_run,
        skip_fetch: config.skip_fetch,
        no_progress_bar: config.no_progress_bar,
    };

    let shutdown_token = shutdown::install_signal_handler()?;
    let outcome = pipeline::run_sync(&ctx, &options, shutdown_token).await?;
    print_outcome(&outcome);

    if outcome.interrupted {
        tracing::info!("Run interrupted; staged files will be picked up next time");
    }
    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn fetch_summary(fetch: &fetch::FetchReport) -> String {
    let mut summary = format!(
        "Fetch: {} group(s) staged, {} profile(s) failed",
        fetch.staged.len(),
        fetch.failed_profiles.len()
    );
    // Dry runs count would-be groups, not files.
    if fetch.planned > 0 {
        summary.push_str(&format!(", {} group(s) planned", fetch.planned));
    }
    summary
}

fn print_outcome(outcome: &SyncOutcome) {
    if let Some(fetch) = &outcome.fetch {
        tracing::info!("{}", fetch_summary(fetch));
        for owner in &fetch.failed_profiles {
            tracing::warn!("  Not fetched: {}", owner);
        }
    }
    if !outcome.classify_errors.is_empty() {
        tracing::error!(
            "{} staged group(s) could not be routed and were left in place",
            outcome.classify_errors.len()
        );
    }
    if let Some(transfer) = &outcome.transfer {
        tracing::info!(
            "Upload: {} image(s), {} video(s), {} group(s) reclaimed",
            transfer.images.uploaded,
            transfer.videos.uploaded,
            transfer.reclaimed.len()
        );
        if transfer.images.halted {
            tracing::error!("Image queue halted on a failed upload");
        }
        if transfer.videos.halted {
            tracing::error!("Video queue halted on a failed upload");
        }
    }
}

/// Run the status command.
async fn run_status(args: cli::StatusArgs) -> anyhow::Result<()> {
    let paths = Paths::from_args(&args.paths);

    let checkpoint = CheckpointStore::new(paths.checkpoint());
    match checkpoint.peek().await? {
        Some(t) => println!("Checkpoint: {}", format_timestamp(&t)),
        None => println!("Checkpoint: none (next run starts from its own start time)"),
    }
    println!("  ({})", checkpoint.path().display());
    println!();

    let staging = StagingArea::new(&paths.staging_dir);
    let groups = staging.groups().await?;
    println!("Staging area: {}", staging.root().display());
    if groups.is_empty() {
        println!("  (empty)");
    }
    for entry in &groups {
        let media = staging::count_media_files(&entry.path).await?;
        println!("  {:<40} {} file(s)", entry.group.to_string(), media);
    }
    println!();

    let db_path = paths.ledger();
    if !db_path.exists() {
        println!("No ledger found at {}", db_path.display());
        return Ok(());
    }
    let db = state::SqliteStateDb::open(&db_path).await?;
    let summary = db.get_summary().await?;

    println!("Ledger: {}", db_path.display());
    println!("  Uploads: {}", summary.total_uploads);
    println!("  Images:  {}", summary.images_uploaded);
    println!("  Videos:  {}", summary.videos_uploaded);

    if let Some(run) = &summary.last_run {
        println!();
        println!("Last run started:   {}", run.started_at.format(RECENT_FORMAT));
        if let Some(completed) = &run.completed_at {
            println!("Last run completed: {}", completed.format(RECENT_FORMAT));
        }
        let s = &run.stats;
        println!(
            "  staged {}, failed profiles {}, uploaded {}+{}, failed uploads {}, reclaimed {}, config errors {}{}",
            s.groups_staged,
            s.profiles_failed,
            s.images_uploaded,
            s.videos_uploaded,
            s.uploads_failed,
            s.groups_reclaimed,
            s.config_errors,
            if s.interrupted { ", interrupted" } else { "" }
        );
    }

    let recent = db.recent_uploads(args.recent).await?;
    if !recent.is_empty() {
        println!();
        println!("Recent uploads:");
        for upload in recent {
            println!(
                "  {} {}/{} #{} {} -> {}",
                upload.uploaded_at.format(RECENT_FORMAT),
                upload.owner,
                upload.kind,
                upload.ordinal,
                upload.file_name,
                upload.url
            );
        }
    }
    Ok(())
}

/// Run the check-links command.
async fn run_check_links(args: cli::CheckLinksArgs) -> anyhow::Result<()> {
    let paths = Paths::from_args(&args.paths);
    let routing = RoutingTable::load(&paths.routes)?;
    let links = routing.links();

    let probe = Arc::new(linkcheck::HttpProbe::new(Duration::from_secs(
        args.request_timeout,
    ))?);
    let shutdown_token = shutdown::install_signal_handler()?;
    let report = linkcheck::check_links(
        probe,
        &links,
        args.workers,
        linkcheck::DEFAULT_PAUSE,
        shutdown_token,
    )
    .await;

    println!("Reachable: {}/{}", report.reachable, links.len());
    if !report.broken.is_empty() {
        println!("Broken:");
        for (link, reason) in &report.broken {
            println!("  {} ({})", link, reason);
        }
    }
    if !report.unchecked.is_empty() {
        println!("Not checked: {}", report.unchecked.len());
    }
    if report.rate_limited {
        println!("Rate limited: rerun later or with fewer --workers");
    }

    if !report.broken.is_empty() || !report.unchecked.is_empty() {
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
        Command::Sync(args) => run_sync(args).await,
        Command::Status(args) => run_status(args).await,
        Command::CheckLinks(args) => run_check_links(args).await,
    }
}
