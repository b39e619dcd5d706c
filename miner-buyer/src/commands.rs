//! Command execution.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chain_time::{DeadlineWindowClassifier, Disposition, TimeWindow};
use lotus_gateway::{Address, ChainGateway, LotusClient, MinerApi, MinerRpcClient};
use tracing::{debug, info};

use crate::admission::AdmissionGate;
use crate::cli::Commands;
use crate::config::AppConfig;
use crate::daemon::{DaemonController, DaemonSettings};
use crate::error::{Error, Result};
use crate::ledger::RunLedger;
use crate::lifecycle::{CreateOutcome, LifecycleOrchestrator};
use crate::transfer::{OwnershipTransfer, parse_bulk_file};

fn parse_address(value: &str, what: &str) -> Result<Address> {
    value
        .parse()
        .map_err(|e| Error::config(format!("{what}: {e}")))
}

/// Runs one CLI command against the configured node and miner.
pub struct CommandExecutor {
    config: AppConfig,
}

impl CommandExecutor {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn execute(self, command: Commands) -> Result<()> {
        match command {
            Commands::Buy { window } => {
                let executor = Self::new(self.config.with_window(&window)?);
                executor.buy().await
            }
            Commands::Info { worker, window } => {
                let worker = parse_address(&worker, "worker")?;
                let executor = Self::new(self.config.with_window(&window)?);
                executor.info(&worker).await
            }
            Commands::Backup { worker } => {
                let worker = parse_address(&worker, "worker")?;
                self.backup(&worker).await
            }
            Commands::Transfer { miner, new, owner } => {
                let miner = parse_address(&miner, "--miner")?;
                let new = parse_address(&new, "--new")?;
                let owner = owner
                    .as_deref()
                    .map(|o| parse_address(o, "--owner"))
                    .transpose()?;
                self.transfer(&miner, &new, owner.as_ref()).await
            }
            Commands::BulkTransfer { file, new } => {
                let new = new
                    .as_deref()
                    .map(|n| parse_address(n, "--new"))
                    .transpose()?;
                self.bulk_transfer(&file, new.as_ref()).await
            }
            Commands::Ledger => self.ledger().await,
        }
    }

    fn gateway(&self) -> Result<Arc<dyn ChainGateway>> {
        let client = LotusClient::new(&self.config.lotus_api, self.config.lotus_token.clone())
            .map_err(|e| Error::config(format!("LOTUS_API: {e}")))?;
        debug!(url = %client.url(), "Lotus node endpoint");
        Ok(Arc::new(client))
    }

    fn miner_api(&self) -> Result<Arc<dyn MinerApi>> {
        let client = MinerRpcClient::new(&self.config.miner_api, self.config.miner_token.clone())
            .map_err(|e| Error::config(format!("LOTUSMINER_API: {e}")))?;
        debug!(url = %client.url(), "Miner endpoint");
        Ok(Arc::new(client))
    }

    fn orchestrator(&self, gateway: Arc<dyn ChainGateway>) -> Result<LifecycleOrchestrator> {
        let miner_api = self.miner_api()?;
        let settings = DaemonSettings {
            lotus_miner_bin: self.config.lotus_miner_bin.clone(),
            lotus_bin: self.config.lotus_bin.clone(),
            output_mode: self.config.output_mode,
            startup_timeout: self.config.startup_timeout,
            ..DaemonSettings::default()
        };
        let daemon = DaemonController::new(self.config.paths.clone(), settings, miner_api.clone());
        let classifier = DeadlineWindowClassifier::new(
            self.config.clock,
            self.config.window_or_default(),
            self.config.zone,
        );

        Ok(LifecycleOrchestrator::new(
            gateway,
            miner_api,
            Arc::new(daemon),
            classifier,
            self.config.paths.clone(),
            self.config.confidence,
        ))
    }

    /// `buy`: create a miner when fees allow.
    pub async fn buy(&self) -> Result<()> {
        let owner = self.config.require_owner()?;
        let threshold = self.config.require_threshold()?;
        let gateway = self.gateway()?;
        let gate = AdmissionGate::new(gateway.clone(), threshold);

        match self.orchestrator(gateway)?.create(&gate, owner).await? {
            CreateOutcome::Rejected(decision) => {
                match decision.estimate {
                    Some(estimate) => println!(
                        "Fee estimate {estimate} is not below threshold {}; no miner created",
                        decision.threshold
                    ),
                    None => println!("Fee estimate unavailable; no miner created"),
                }
            }
            CreateOutcome::Completed(report) => {
                let miner = report
                    .miner
                    .as_ref()
                    .map_or_else(|| "-".to_string(), |m| m.to_string());
                let disposition = report.disposition.map_or("-", |d| d.as_str());
                println!("{}\t{}\t{}", report.worker, miner, disposition);
            }
        }
        Ok(())
    }

    /// `info <worker>`: resume a backed-up miner and report its deadline hour.
    pub async fn info(&self, worker: &Address) -> Result<()> {
        let gateway = self.gateway()?;
        let report = self.orchestrator(gateway.clone())?.resume(worker).await?;

        let (Some(classification), Some(miner)) = (report.classification, report.miner) else {
            return Err(Error::ledger("resume finished without a classification"));
        };

        let holder = if hour_in_window(self.config.window, classification.hour) {
            let owner = match &self.config.owner {
                Some(owner) => owner.clone(),
                None => {
                    gateway
                        .miner_info(&miner)
                        .await
                        .map_err(Error::chain_read(format!("reading miner info of {miner}")))?
                        .owner
                }
            };
            Some(owner)
        } else {
            None
        };
        println!(
            "{}",
            info_output(classification.hour, holder.as_ref().map(|owner| (owner, &miner)))
        );
        Ok(())
    }

    /// `backup <worker>`: archive an existing data directory.
    pub async fn backup(&self, worker: &Address) -> Result<()> {
        let gateway = self.gateway()?;
        let report = self.orchestrator(gateway)?.archive(worker).await?;
        if let Some(path) = &report.relocated_to {
            println!("{}", path.display());
        }
        Ok(())
    }

    /// `transfer`: hand one miner to a new owner.
    pub async fn transfer(
        &self,
        miner: &Address,
        new_owner: &Address,
        owner: Option<&Address>,
    ) -> Result<()> {
        let owner = match owner {
            Some(owner) => owner,
            None => self.config.require_owner()?,
        };
        let transfer = OwnershipTransfer::new(self.gateway()?, self.config.confidence);
        let report = transfer.transfer(miner, owner, new_owner).await?;
        println!(
            "{}\t{}\t{}\t{}",
            report.miner, report.new_owner, report.proposal, report.confirmation
        );
        Ok(())
    }

    /// A relative bulk file is looked up in the working directory, then in the home prefix.
    fn locate_bulk_file(&self, file: &Path) -> PathBuf {
        if file.is_relative() && !file.exists() {
            let in_home = self.config.paths.home().join(file);
            if in_home.exists() {
                return in_home;
            }
        }
        file.to_path_buf()
    }

    /// `bulk-transfer`: hand every listed miner to a new owner.
    pub async fn bulk_transfer(&self, file: &Path, new_owner: Option<&Address>) -> Result<()> {
        let owner = self.config.require_owner()?;
        let path = self.locate_bulk_file(file);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::io_path("reading", &path, e))?;
        let entries = parse_bulk_file(&contents)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;
        info!(file = %path.display(), entries = entries.len(), "Loaded bulk transfer file");

        let runs = RunLedger::new(self.config.paths.run_ledger());
        let transfer = OwnershipTransfer::new(self.gateway()?, self.config.confidence);
        for report in transfer
            .bulk_transfer(&entries, owner, new_owner, &runs)
            .await?
        {
            println!(
                "{}\t{}\t{}\t{}",
                report.miner, report.new_owner, report.proposal, report.confirmation
            );
        }
        Ok(())
    }

    /// `ledger`: current disposition and last state per worker.
    pub async fn ledger(&self) -> Result<()> {
        let runs = RunLedger::new(self.config.paths.run_ledger());
        for summary in runs.summaries().await? {
            println!(
                "{}\t{}\t{}\t{}",
                summary.worker,
                summary.disposition.as_ref().map_or("-", Disposition::as_str),
                summary.state,
                summary
                    .miner
                    .as_ref()
                    .map_or_else(|| "-".to_string(), |m| m.to_string()),
            );
        }
        Ok(())
    }
}

fn hour_in_window(window: Option<TimeWindow>, hour: u32) -> bool {
    window.is_some_and(|window| window.contains(hour))
}

/// `info` prints the owner and miner of an in-window miner, and the bare
/// deadline hour otherwise.
fn info_output(hour: u32, holder: Option<(&Address, &Address)>) -> String {
    match holder {
        Some((owner, miner)) => format!("{owner}\t{miner}"),
        None => hour.to_string(),
    }
}
