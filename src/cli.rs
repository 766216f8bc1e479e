use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "instavk-sync",
    about = "Mirror new Instagram posts and stories into VK albums",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Arguments for the default `sync` command
    #[command(flatten)]
    pub sync: SyncArgs,

    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,
}

impl Cli {
    /// `sync` when no subcommand is given.
    pub fn effective_command(self) -> Command {
        self.command.unwrap_or(Command::Sync(self.sync))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch new items, upload everything staged, reclaim empty groups
    Sync(SyncArgs),

    /// Show checkpoint, staged groups and the last recorded run
    Status(StatusArgs),

    /// Check that every link in the routing file is reachable
    CheckLinks(CheckLinksArgs),
}

/// Locations shared by every command.
#[derive(Args, Debug, Clone)]
pub struct PathArgs {
    /// Directory holding the checkpoint, ledger and default routing file
    #[arg(long, default_value = "~/.instavk-sync")]
    pub data_dir: String,

    /// Routing file (default: <data-dir>/links.csv)
    #[arg(long)]
    pub routes: Option<String>,

    /// Staging directory (default: <data-dir>/staging)
    #[arg(long)]
    pub staging_dir: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    /// Instagram `sessionid` cookie value.
    /// WARNING: passing via --instagram-session is visible in process listings.
    /// Prefer the INSTAGRAM_SESSIONID environment variable instead.
    #[arg(long, env = "INSTAGRAM_SESSIONID", hide_env_values = true)]
    pub instagram_session: Option<String>,

    /// VK access token with photos and video scope.
    /// Prefer the VK_ACCESS_TOKEN environment variable.
    #[arg(long, env = "VK_ACCESS_TOKEN", hide_env_values = true)]
    pub vk_token: Option<String>,

    /// Max retries per remote call (0 = no retries)
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Initial retry delay in seconds
    #[arg(long, default_value_t = 5)]
    pub retry_delay: u64,

    /// Seconds to wait between consecutive video uploads
    #[arg(long, default_value_t = 3)]
    pub video_pause: u64,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub request_timeout: u64,

    /// Upload what is already staged without fetching anything new
    #[arg(long)]
    pub skip_fetch: bool,

    /// Log what would be staged and uploaded without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    /// Number of recent uploads to list
    #[arg(long, default_value_t = 10)]
    pub recent: usize,
}

#[derive(Args, Debug, Clone)]
pub struct CheckLinksArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    /// Number of parallel workers
    #[arg(long, default_value_t = crate::linkcheck::DEFAULT_WORKERS)]
    pub workers: usize,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub request_timeout: u64,
}
