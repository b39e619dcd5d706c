//! Storage-miner daemon process control.
//!
//! Every stage of a miner's life is one `lotus-miner` invocation against the
//! worker's data directory. `run` is the only long-lived child; it is spawned
//! by [`DaemonController::start`] and reaped by [`DaemonController::stop`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lotus_gateway::{Address, MinerApi};
use parking_lot::Mutex;
use process_utils::{OutputMode, output_checked, run_checked, tokio_command, wait_or_kill};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Paths;
use crate::error::{Error, Result};

/// Name of the relocated data directory inside a backup directory.
pub const RELOCATED_DIR_NAME: &str = "lotusminer";

const TOKEN_FILE: &str = "token";
const STORAGE_INDEX_FILE: &str = "storage.json";
const KEY_FILE: &str = "key";
const ARCHIVE_FILE: &str = "bak";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle operations on a worker's miner daemon.
#[async_trait]
pub trait MinerDaemon: Send + Sync {
    /// Data directory of the daemon for `worker`.
    fn data_dir(&self, worker: &Address) -> PathBuf;

    /// A data directory on disk means the daemon has been initialized.
    fn is_initialized(&self, worker: &Address) -> bool {
        self.data_dir(worker).is_dir()
    }

    async fn initialize(&self, owner: &Address, worker: &Address) -> Result<()>;

    /// Restore from `archive`; a no-op when the data directory already exists.
    async fn restore(&self, worker: &Address, archive: &Path) -> Result<()>;

    /// Spawn the daemon and wait until its API answers.
    async fn start(&self, worker: &Address) -> Result<()>;

    async fn stop(&self, worker: &Address) -> Result<()>;

    /// Write the daemon archive to `<dest>/bak` and the worker key to `<dest>/key`.
    async fn backup(&self, worker: &Address, dest: &Path) -> Result<()>;

    /// Move the data directory to `<dest>/lotusminer`, returning the new path.
    async fn relocate(&self, worker: &Address, dest: &Path) -> Result<PathBuf>;
}

/// Executables and timing for [`DaemonController`].
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub lotus_miner_bin: PathBuf,
    pub lotus_bin: PathBuf,
    pub output_mode: OutputMode,
    pub startup_timeout: Duration,
    pub poll_interval: Duration,
    pub stop_timeout: Duration,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            lotus_miner_bin: PathBuf::from("lotus-miner"),
            lotus_bin: PathBuf::from("lotus"),
            output_mode: OutputMode::Discard,
            startup_timeout: Duration::from_secs(120),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// [`MinerDaemon`] backed by the `lotus-miner` executable.
pub struct DaemonController {
    paths: Paths,
    settings: DaemonSettings,
    miner_api: Arc<dyn MinerApi>,
    /// `run` children by worker address.
    children: Mutex<HashMap<Address, Child>>,
}

impl DaemonController {
    pub fn new(paths: Paths, settings: DaemonSettings, miner_api: Arc<dyn MinerApi>) -> Self {
        Self {
            paths,
            settings,
            miner_api,
            children: Mutex::new(HashMap::new()),
        }
    }

    /// `lotus-miner` pointed at the worker's data directory.
    fn miner_command(&self, worker: &Address, trust_params: bool) -> Command {
        let mut cmd = tokio_command(&self.settings.lotus_miner_bin);
        cmd.env("LOTUS_MINER_PATH", self.paths.miner_dir(worker));
        if trust_params {
            cmd.env("TRUST_PARAMS", "1");
        }
        cmd
    }

    /// One readiness probe: token file present and `Version` answered.
    async fn probe(&self, worker: &Address) -> std::result::Result<String, String> {
        let token_path = self.paths.miner_dir(worker).join(TOKEN_FILE);
        let token = tokio::fs::read_to_string(&token_path)
            .await
            .map_err(|e| format!("token not readable at {}: {e}", token_path.display()))?;
        let token = token.trim();
        if token.is_empty() {
            return Err(format!("token file {} is empty", token_path.display()));
        }
        self.miner_api.set_token(token);
        self.miner_api
            .version()
            .await
            .map(|v| v.version)
            .map_err(|e| format!("API not answering: {e}"))
    }

    async fn wait_until_ready(&self, worker: &Address, child: &mut Child) -> Result<()> {
        let deadline = Instant::now() + self.settings.startup_timeout;
        loop {
            if let Some(status) = child
                .try_wait()
                .map_err(|e| Error::start(worker, format!("cannot poll daemon process: {e}")))?
            {
                return Err(Error::start(worker, format!("daemon exited during startup ({status})")));
            }

            // a daemon that accepts but never answers must not outlive the deadline
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.probe(worker)).await {
                Ok(Ok(version)) => {
                    info!(%worker, %version, "Miner daemon ready");
                    return Ok(());
                }
                Ok(Err(reason)) => debug!(%worker, "Miner daemon not ready: {}", reason),
                Err(_) => debug!(%worker, "Miner daemon API did not answer before the deadline"),
            }

            if Instant::now() >= deadline {
                return Err(Error::StartupTimeout {
                    worker: worker.to_string(),
                    timeout: self.settings.startup_timeout,
                });
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}

#[async_trait]
impl MinerDaemon for DaemonController {
    fn data_dir(&self, worker: &Address) -> PathBuf {
        self.paths.miner_dir(worker)
    }

    async fn initialize(&self, owner: &Address, worker: &Address) -> Result<()> {
        info!(%owner, %worker, "Initializing miner");
        let mut cmd = self.miner_command(worker, true);
        cmd.arg("init")
            .arg(format!("--owner={owner}"))
            .arg(format!("--worker={worker}"))
            .arg("--no-local-storage");
        run_checked(&mut cmd, self.settings.output_mode)
            .await
            .map_err(|e| Error::init(worker, e))
    }

    async fn restore(&self, worker: &Address, archive: &Path) -> Result<()> {
        let data_dir = self.paths.miner_dir(worker);
        if data_dir.exists() {
            info!(%worker, path = %data_dir.display(), "Data directory present, skipping restore");
            return Ok(());
        }

        info!(%worker, archive = %archive.display(), "Restoring miner");
        let mut cmd = self.miner_command(worker, true);
        cmd.arg("init").arg("restore").arg(archive);
        run_checked(&mut cmd, self.settings.output_mode)
            .await
            .map_err(|e| Error::restore(worker, e))?;

        // The archive carries no storage paths; the daemon refuses to run without an index.
        let index = data_dir.join(STORAGE_INDEX_FILE);
        tokio::fs::write(&index, b"{}")
            .await
            .map_err(|e| Error::restore(worker, format!("writing {}: {e}", index.display())))
    }

    async fn start(&self, worker: &Address) -> Result<()> {
        if self.children.lock().contains_key(worker) {
            return Err(Error::start(worker, "daemon already started by this process"));
        }

        info!(%worker, "Starting miner daemon");
        let mut cmd = self.miner_command(worker, true);
        cmd.arg("run").stdin(std::process::Stdio::null());
        self.settings.output_mode.apply(&mut cmd);
        if self.settings.output_mode == OutputMode::Discard {
            // Nobody drains a long-lived daemon's stderr.
            cmd.stderr(std::process::Stdio::null());
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::start(worker, format!("spawning daemon: {e}")))?;

        if let Err(e) = self.wait_until_ready(worker, &mut child).await {
            if let Err(kill_err) = child.kill().await {
                debug!(%worker, "Killing unready daemon failed: {}", kill_err);
            }
            return Err(e);
        }

        self.children.lock().insert(worker.clone(), child);
        Ok(())
    }

    async fn stop(&self, worker: &Address) -> Result<()> {
        info!(%worker, "Stopping miner daemon");
        let mut cmd = self.miner_command(worker, false);
        cmd.arg("stop");
        let stopped = run_checked(&mut cmd, self.settings.output_mode).await;

        let child = self.children.lock().remove(worker);
        if let Some(mut child) = child {
            match wait_or_kill(&mut child, self.settings.stop_timeout).await {
                Ok(Some(status)) => debug!(%worker, %status, "Daemon exited"),
                Ok(None) => warn!(%worker, "Daemon ignored stop and was killed"),
                Err(e) => warn!(%worker, "Reaping daemon failed: {}", e),
            }
        }

        stopped.map_err(|e| Error::stop(worker, e))
    }

    async fn backup(&self, worker: &Address, dest: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| Error::backup(worker, format!("creating {}: {e}", dest.display())))?;

        let archive = dest.join(ARCHIVE_FILE);
        info!(%worker, archive = %archive.display(), "Backing up miner");
        let mut cmd = self.miner_command(worker, false);
        // The daemon is stopped by now, so back up the repository directly.
        cmd.arg("backup").arg("--offline").arg(&archive);
        run_checked(&mut cmd, self.settings.output_mode)
            .await
            .map_err(|e| Error::backup(worker, e))?;

        let mut export = tokio_command(&self.settings.lotus_bin);
        export.arg("wallet").arg("export").arg(worker.as_str());
        let key = output_checked(&mut export)
            .await
            .map_err(|e| Error::backup(worker, format!("exporting worker key: {e}")))?;

        let key_path = dest.join(KEY_FILE);
        tokio::fs::write(&key_path, key)
            .await
            .map_err(|e| Error::backup(worker, format!("writing {}: {e}", key_path.display())))
    }

    async fn relocate(&self, worker: &Address, dest: &Path) -> Result<PathBuf> {
        let source = self.paths.miner_dir(worker);
        let target = dest.join(RELOCATED_DIR_NAME);

        if !source.is_dir() {
            return Err(Error::relocate(&source, &target, "no data directory"));
        }
        if tokio::fs::try_exists(&target).await.unwrap_or(true) {
            return Err(Error::relocate(&source, &target, "destination already exists"));
        }

        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| Error::relocate(&source, &target, e))?;
        tokio::fs::rename(&source, &target)
            .await
            .map_err(|e| Error::relocate(&source, &target, e))?;

        info!(%worker, to = %target.display(), "Relocated data directory");
        Ok(target)
    }
}
