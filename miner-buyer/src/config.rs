//! Resolved configuration.
//!
//! Flags and environment are parsed by [`crate::cli::Args`]; everything that
//! needs validating (addresses, the fee threshold, the time window, the
//! observer zone) is parsed exactly once here into an [`AppConfig`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use chain_time::{Disposition, EpochClock, ObserverZone, TimeWindow};
use lotus_gateway::{Address, TokenAmount};
use process_utils::OutputMode;
use tracing::warn;

use crate::cli::{Args, WindowArgs};
use crate::error::{Error, Result};

const BACKUP_DIR_NAME: &str = ".lotusbackup";
const RUN_LEDGER_FILE: &str = "runs.jsonl";

/// Filesystem layout under the home prefix.
///
/// ```text
/// <home>/.lotusminer-<worker>/        daemon data directory
/// <home>/.lotusbackup/<worker>/bak    daemon backup archive
/// <home>/.lotusbackup/<worker>/key    exported worker key
/// <home>/.lotusbackup/<worker>/lotusminer
/// <home>/{keep,sell,backup}miner.list
/// <home>/runs.jsonl
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    home: PathBuf,
}

impl Paths {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Data directory of the daemon initialized for `worker`.
    pub fn miner_dir(&self, worker: &Address) -> PathBuf {
        self.home.join(format!(".lotusminer-{worker}"))
    }

    pub fn backup_root(&self) -> PathBuf {
        self.home.join(BACKUP_DIR_NAME)
    }

    pub fn backup_dir(&self, worker: &Address) -> PathBuf {
        self.backup_root().join(worker.as_str())
    }

    /// Archive written by `lotus-miner backup` and read by `init restore`.
    pub fn backup_archive(&self, worker: &Address) -> PathBuf {
        self.backup_dir(worker).join("bak")
    }

    pub fn ledger_file(&self, disposition: Disposition) -> PathBuf {
        self.home.join(disposition.ledger_file_name())
    }

    pub fn run_ledger(&self) -> PathBuf {
        self.home.join(RUN_LEDGER_FILE)
    }
}

/// Everything a command needs, validated.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub owner: Option<Address>,
    pub threshold: Option<TokenAmount>,
    /// Explicitly requested window; commands fall back to 09:00-17:00.
    pub window: Option<TimeWindow>,
    pub zone: ObserverZone,
    pub clock: EpochClock,
    pub paths: Paths,
    pub lotus_api: String,
    pub lotus_token: Option<String>,
    pub miner_api: String,
    pub miner_token: Option<String>,
    pub lotus_miner_bin: PathBuf,
    pub lotus_bin: PathBuf,
    pub startup_timeout: Duration,
    pub confidence: u64,
    pub output_mode: OutputMode,
}

impl AppConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        let home = match &args.home {
            Some(home) => home.clone(),
            None => dirs::home_dir()
                .ok_or_else(|| Error::config("cannot determine home directory; set MINER_BUYER_HOME"))?,
        };

        let owner = args
            .owner
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<Address>())
            .transpose()
            .map_err(|e| Error::config(format!("OWNER_ADDR: {e}")))?;

        let threshold = args
            .threshold
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(TokenAmount::parse)
            .transpose()
            .map_err(|e| Error::config(format!("THRESHOLD: {e}")))?;

        let zone: ObserverZone = args.timezone.parse()?;

        if args.startup_timeout == 0 {
            return Err(Error::config("--startup-timeout must be positive"));
        }

        Ok(Self {
            owner,
            threshold,
            window: None,
            zone,
            clock: EpochClock::MAINNET,
            paths: Paths::new(home),
            lotus_api: args.lotus_api.clone(),
            lotus_token: args.lotus_token.clone(),
            miner_api: args.miner_api.clone(),
            miner_token: args.miner_token.clone(),
            lotus_miner_bin: args.lotus_miner_bin.clone(),
            lotus_bin: args.lotus_bin.clone(),
            startup_timeout: Duration::from_secs(args.startup_timeout),
            confidence: args.confidence,
            output_mode: OutputMode::from_verbose(args.debug),
        })
    }

    /// Apply a command's `--start/--finish` pair.
    pub fn with_window(mut self, window: &WindowArgs) -> Result<Self> {
        self.window = match (&window.start, &window.finish) {
            (Some(start), Some(finish)) => Some(TimeWindow::parse(start, finish)?),
            (None, None) => None,
            _ => return Err(Error::config("--start and --finish must be given together")),
        };
        if let Some(window) = self.window.filter(TimeWindow::is_empty) {
            warn!(%window, "Start is after finish; no deadline hour falls inside this window");
        }
        Ok(self)
    }

    pub fn window_or_default(&self) -> TimeWindow {
        self.window.unwrap_or_default()
    }

    pub fn require_owner(&self) -> Result<&Address> {
        self.owner
            .as_ref()
            .ok_or_else(|| Error::config("owner address required; set OWNER_ADDR or --owner-addr"))
    }

    pub fn require_threshold(&self) -> Result<TokenAmount> {
        self.threshold
            .ok_or_else(|| Error::config("fee threshold required; set THRESHOLD or --threshold"))
    }
}
