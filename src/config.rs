use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::{PathArgs, SyncArgs};
use crate::retry::RetryConfig;

/// Where everything lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub data_dir: PathBuf,
    pub routes: PathBuf,
    pub staging_dir: PathBuf,
}

impl Paths {
    pub fn from_args(args: &PathArgs) -> Self {
        let data_dir = expand_tilde(&args.data_dir);
        let routes = args
            .routes
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(|| data_dir.join("links.csv"));
        let staging_dir = args
            .staging_dir
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(|| data_dir.join("staging"));
        Self {
            data_dir,
            routes,
            staging_dir,
        }
    }

    pub fn checkpoint(&self) -> PathBuf {
        self.data_dir.join("last_start")
    }

    pub fn ledger(&self) -> PathBuf {
        self.data_dir.join("state.db")
    }
}

/// Validated settings of a `sync` run.
pub struct Config {
    pub paths: Paths,
    pub instagram_session: Option<String>,
    pub vk_token: String,
    pub retry: RetryConfig,
    pub video_pause: Duration,
    pub request_timeout: Duration,
    pub skip_fetch: bool,
    pub dry_run: bool,
    pub no_progress_bar: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("paths", &self.paths)
            .field(
                "instagram_session",
                &self.instagram_session.as_ref().map(|_| "<redacted>"),
            )
            .field("vk_token", &"<redacted>")
            .field("retry", &self.retry)
            .field("video_pause", &self.video_pause)
            .field("skip_fetch", &self.skip_fetch)
            .field("dry_run", &self.dry_run)
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

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_args(args: SyncArgs) -> anyhow::Result<Self> {
        let instagram_session = non_empty(args.instagram_session);
        if instagram_session.is_none() && !args.skip_fetch {
            anyhow::bail!(
                "An Instagram session is required to fetch new items. \
                 Set INSTAGRAM_SESSIONID (or pass --skip-fetch to upload what is already staged)"
            );
        }
        let Some(vk_token) = non_empty(args.vk_token) else {
            anyhow::bail!("A VK access token is required. Set VK_ACCESS_TOKEN");
        };
        if args.request_timeout == 0 {
            anyhow::bail!("--request-timeout must be at least 1 second");
        }

        Ok(Self {
            paths: Paths::from_args(&args.paths),
            instagram_session,
            vk_token,
            retry: RetryConfig {
                max_retries: args.max_retries,
                base_delay_secs: args.retry_delay,
                ..RetryConfig::default()
            },
            video_pause: Duration::from_secs(args.video_pause),
            request_timeout: Duration::from_secs(args.request_timeout),
            skip_fetch: args.skip_fetch,
            dry_run: args.dry_run,
            no_progress_bar: args.no_progress_bar,
        })
    }

    pub fn staging_dir(&self) -> &Path {
        &self.paths.staging_dir
    }
}
