//! Append-only ledgers.
//!
//! - [`DispositionLedgers`]: `keepminer.list`, `sellminer.list` and
//!   `backupminer.list`, one worker address per line.
//! - [`RunLedger`]: `runs.jsonl`, one [`RunRecord`] per line, covering every
//!   lifecycle transition, classification and disposition. Current
//!   dispositions are derived from it, never edited in place.

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use chain_time::Disposition;
use chrono::{DateTime, Utc};
use lotus_gateway::Address;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::warn;
use uuid::Uuid;

use crate::config::Paths;
use crate::error::{Error, Result};
use crate::lifecycle::LifecycleState;

async fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_path("creating directory", parent, e))?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| Error::io_path("opening ledger", path, e))?;
    // a crash mid-append leaves an unterminated line; start a fresh one after it
    let torn = ends_unterminated(&mut file)
        .await
        .map_err(|e| Error::io_path("reading ledger", path, e))?;
    let entry = if torn {
        format!("\n{line}\n")
    } else {
        format!("{line}\n")
    };
    file.write_all(entry.as_bytes())
        .await
        .map_err(|e| Error::io_path("appending to ledger", path, e))?;
    file.flush()
        .await
        .map_err(|e| Error::io_path("flushing ledger", path, e))
}

async fn ends_unterminated(file: &mut tokio::fs::File) -> std::io::Result<bool> {
    if file.metadata().await?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] != b'\n')
}

async fn read_optional(path: &Path) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(Error::io_path("reading ledger", path, e)),
    }
}

/// The three flat disposition lists.
#[derive(Debug, Clone)]
pub struct DispositionLedgers {
    paths: Paths,
}

impl DispositionLedgers {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    pub fn path(&self, disposition: Disposition) -> PathBuf {
        self.paths.ledger_file(disposition)
    }

    pub async fn append(&self, disposition: Disposition, worker: &Address) -> Result<()> {
        append_line(&self.path(disposition), worker.as_str()).await
    }

    /// Workers listed under `disposition`, oldest first.
    pub async fn entries(&self, disposition: Disposition) -> Result<Vec<Address>> {
        let path = self.path(disposition);
        read_optional(&path)
            .await?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.parse::<Address>().map_err(|e| {
                    Error::ledger(format!("{}: {e}", path.display()))
                })
            })
            .collect()
    }
}

/// Which protocol a run follows.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunProtocol {
    Create,
    Resume,
    Archive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunEvent {
    Transition {
        from: LifecycleState,
        to: LifecycleState,
    },
    Classified {
        hour: u32,
        zeroth_deadline: DateTime<Utc>,
        disposition: Disposition,
    },
    Disposition {
        disposition: Disposition,
        backup_dir: PathBuf,
    },
    Failed {
        error_kind: String,
        message: String,
    },
}

/// One line of `runs.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub timestamp: DateTime<Utc>,
    pub run_id: Uuid,
    pub protocol: RunProtocol,
    pub worker: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miner: Option<Address>,
    #[serde(flatten)]
    pub event: RunEvent,
}

/// What the run ledger says about one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub worker: Address,
    pub miner: Option<Address>,
    pub state: LifecycleState,
    pub disposition: Option<Disposition>,
    pub updated_at: DateTime<Utc>,
}

/// The `runs.jsonl` ledger.
#[derive(Debug, Clone)]
pub struct RunLedger {
    path: PathBuf,
}

impl RunLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &RunRecord) -> Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| Error::ledger(format!("encoding run record: {e}")))?;
        append_line(&self.path, &line).await
    }

    /// Every readable record, in append order.
    ///
    /// Lines that do not parse (a torn tail after a crash) are skipped with a
    /// warning rather than failing the whole read.
    pub async fn records(&self) -> Result<Vec<RunRecord>> {
        let contents = read_optional(&self.path).await?;
        let records = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(index, line)| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        line = index + 1,
                        "Skipping malformed run record: {}",
                        e
                    );
                    None
                }
            })
            .collect();
        Ok(records)
    }

    /// Latest known state, miner and disposition of every worker.
    pub async fn summaries(&self) -> Result<Vec<WorkerSummary>> {
        let mut by_worker: BTreeMap<Address, WorkerSummary> = BTreeMap::new();

        for record in self.records().await? {
            let summary = by_worker
                .entry(record.worker.clone())
                .or_insert_with(|| WorkerSummary {
                    worker: record.worker.clone(),
                    miner: None,
                    state: LifecycleState::Uninitialized,
                    disposition: None,
                    updated_at: record.timestamp,
                });

            if record.miner.is_some() {
                summary.miner = record.miner.clone();
            }
            summary.updated_at = record.timestamp;
            match record.event {
                RunEvent::Transition { to, .. } => summary.state = to,
                RunEvent::Disposition { disposition, .. } => {
                    summary.disposition = Some(disposition)
                }
                RunEvent::Classified { .. } | RunEvent::Failed { .. } => {}
            }
        }

        Ok(by_worker.into_values().collect())
    }

    /// Miner actor most recently recorded for `worker`.
    pub async fn miner_for_worker(&self, worker: &Address) -> Result<Option<Address>> {
        Ok(self
            .records()
            .await?
            .into_iter()
            .rev()
            .filter(|record| &record.worker == worker)
            .find_map(|record| record.miner))
    }
}
