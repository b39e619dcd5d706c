//! Lifecycle protocols.
//!
//! - **create**: admission, worker key, worker activation, `init`, start,
//!   classify, stop, backup, relocate.
//! - **resume**: restore from the backup archive, start, classify and report,
//!   stop, park the data directory under a timestamped name.
//! - **archive**: start, stop, backup without classification, relocate.
//!
//! Once the daemon has started, it is always stopped again before the
//! protocol returns. A failure of that cleanup stop is logged and the
//! original error is returned.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chain_time::{
    Classification, DeadlineInfo, DeadlineWindowClassifier, Disposition, describe_epoch,
};
use chrono::Utc;
use lotus_gateway::{Address, ChainGateway, KeyType, Message, MinerApi, TokenAmount};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::admission::{AdmissionDecision, AdmissionGate};
use crate::config::Paths;
use crate::daemon::{MinerDaemon, RELOCATED_DIR_NAME};
use crate::error::{Error, Result};
use crate::ledger::{DispositionLedgers, RunEvent, RunLedger, RunProtocol, RunRecord};
use crate::lifecycle::state::LifecycleState;

/// Summary of one completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub protocol: RunProtocol,
    pub worker: Address,
    pub miner: Option<Address>,
    pub deadline: Option<DeadlineInfo>,
    pub classification: Option<Classification>,
    /// Disposition written to a ledger, if any.
    pub disposition: Option<Disposition>,
    pub backup_dir: Option<PathBuf>,
    pub relocated_to: Option<PathBuf>,
    pub final_state: LifecycleState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CreateOutcome {
    /// Fees too high (or unknown); nothing was spawned or recorded.
    Rejected(AdmissionDecision),
    Completed(RunReport),
}

/// What to read from the daemon while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inspection {
    MinerId,
    Classify,
}

#[derive(Debug, Default)]
struct Observation {
    deadline: Option<DeadlineInfo>,
    classification: Option<Classification>,
}

/// One run's position in the state machine, mirrored into the run ledger.
struct Run<'a> {
    ledger: &'a RunLedger,
    id: Uuid,
    protocol: RunProtocol,
    worker: Address,
    miner: Option<Address>,
    state: LifecycleState,
}

impl<'a> Run<'a> {
    fn new(
        ledger: &'a RunLedger,
        protocol: RunProtocol,
        worker: Address,
        state: LifecycleState,
    ) -> Self {
        let id = Uuid::new_v4();
        info!(run_id = %id, %protocol, %worker, %state, "Run started");
        Self {
            ledger,
            id,
            protocol,
            worker,
            miner: None,
            state,
        }
    }

    async fn record(&self, event: RunEvent) -> Result<()> {
        self.ledger
            .append(&RunRecord {
                timestamp: Utc::now(),
                run_id: self.id,
                protocol: self.protocol,
                worker: self.worker.clone(),
                miner: self.miner.clone(),
                event,
            })
            .await
    }

    /// Check a transition without taking it.
    fn ensure(&self, to: LifecycleState) -> Result<()> {
        self.state.transition_to(to).map(|_| ())
    }

    async fn advance(&mut self, to: LifecycleState) -> Result<()> {
        let next = self.state.transition_to(to)?;
        self.record(RunEvent::Transition {
            from: self.state,
            to: next,
        })
        .await?;
        debug!(run_id = %self.id, from = %self.state, to = %next, "State transition");
        self.state = next;
        Ok(())
    }

    async fn classified(&self, classification: &Classification) -> Result<()> {
        self.ensure(LifecycleState::Running)?;
        self.record(RunEvent::Classified {
            hour: classification.hour,
            zeroth_deadline: classification.zeroth_deadline,
            disposition: classification.disposition,
        })
        .await
    }

    /// Best effort: the run is already failing.
    async fn fail(&mut self, error: &Error) {
        warn!(run_id = %self.id, worker = %self.worker, state = %self.state, "Run failed: {}", error);
        let event = RunEvent::Failed {
            error_kind: error.kind().to_string(),
            message: error.to_string(),
        };
        if let Err(e) = self.record(event).await {
            warn!(run_id = %self.id, "Could not record failure: {}", e);
        }
        if self.state.is_terminal() {
            return;
        }
        if let Err(e) = self.advance(LifecycleState::Failed).await {
            warn!(run_id = %self.id, "Could not record failed state: {}", e);
            self.state = LifecycleState::Failed;
        }
    }

    fn report(
        &self,
        observation: Observation,
        disposition: Option<Disposition>,
        backup_dir: Option<PathBuf>,
        relocated_to: Option<PathBuf>,
    ) -> RunReport {
        RunReport {
            run_id: self.id,
            protocol: self.protocol,
            worker: self.worker.clone(),
            miner: self.miner.clone(),
            deadline: observation.deadline,
            classification: observation.classification,
            disposition,
            backup_dir,
            relocated_to,
            final_state: self.state,
        }
    }
}

/// Drives miner daemons through the create, resume and archive protocols.
pub struct LifecycleOrchestrator {
    gateway: Arc<dyn ChainGateway>,
    miner_api: Arc<dyn MinerApi>,
    daemon: Arc<dyn MinerDaemon>,
    classifier: DeadlineWindowClassifier,
    paths: Paths,
    ledgers: DispositionLedgers,
    runs: RunLedger,
    confidence: u64,
}

impl LifecycleOrchestrator {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        miner_api: Arc<dyn MinerApi>,
        daemon: Arc<dyn MinerDaemon>,
        classifier: DeadlineWindowClassifier,
        paths: Paths,
        confidence: u64,
    ) -> Self {
        Self {
            gateway,
            miner_api,
            daemon,
            classifier,
            ledgers: DispositionLedgers::new(paths.clone()),
            runs: RunLedger::new(paths.run_ledger()),
            paths,
            confidence,
        }
    }

    pub fn runs(&self) -> &RunLedger {
        &self.runs
    }

    pub fn ledgers(&self) -> &DispositionLedgers {
        &self.ledgers
    }

    fn initial_state(&self, worker: &Address) -> LifecycleState {
        LifecycleState::from_data_dir(self.daemon.is_initialized(worker))
    }

    async fn conclude(&self, mut run: Run<'_>, result: Result<RunReport>) -> Result<RunReport> {
        match result {
            Ok(report) => {
                info!(
                    run_id = %report.run_id,
                    worker = %report.worker,
                    state = %report.final_state,
                    "Run finished"
                );
                Ok(report)
            }
            Err(e) => {
                run.fail(&e).await;
                Err(e)
            }
        }
    }

    /// Create a new miner if the admission gate allows it.
    pub async fn create(&self, gate: &AdmissionGate, owner: &Address) -> Result<CreateOutcome> {
        let decision = gate.evaluate().await;
        if !decision.admitted {
            info!(threshold = %decision.threshold, "Fees above threshold, not creating a miner");
            return Ok(CreateOutcome::Rejected(decision));
        }

        let worker = self
            .gateway
            .new_wallet_key(KeyType::Bls)
            .await
            .map_err(Error::chain_read("creating worker key"))?;
        info!(%worker, %owner, "Created worker key");

        let state = self.initial_state(&worker);
        let mut run = Run::new(&self.runs, RunProtocol::Create, worker, state);
        let result = self.run_create(&mut run, owner).await;
        self.conclude(run, result).await.map(CreateOutcome::Completed)
    }

    async fn run_create(&self, run: &mut Run<'_>, owner: &Address) -> Result<RunReport> {
        let worker = run.worker.clone();
        run.ensure(LifecycleState::Initialized)?;
        let backup_dir = self.paths.backup_dir(&worker);
        self.ensure_relocate_target_free(&worker, &backup_dir).await?;

        self.activate_worker(owner, &worker).await?;
        self.daemon.initialize(owner, &worker).await?;
        run.advance(LifecycleState::Initialized).await?;

        let observation = self.run_daemon(run, Inspection::Classify).await?;
        let disposition = observation
            .classification
            .map(|c| c.disposition)
            .ok_or_else(|| Error::ledger("run finished without a classification"))?;

        self.back_up(run, disposition, &backup_dir).await?;

        let relocated = self.daemon.relocate(&worker, &backup_dir).await?;
        run.advance(LifecycleState::Relocated).await?;

        Ok(run.report(observation, Some(disposition), Some(backup_dir), Some(relocated)))
    }

    /// The owner sends nothing to the fresh worker key so that it exists on chain.
    async fn activate_worker(&self, owner: &Address, worker: &Address) -> Result<()> {
        let message = Message::send(owner.clone(), worker.clone(), TokenAmount::ZERO);
        let id = self
            .gateway
            .submit_message(message)
            .await
            .map_err(Error::chain_read("submitting worker activation"))?;
        info!(%worker, cid = %id, "Worker activation submitted");

        let lookup = self
            .gateway
            .wait_for_message(&id, self.confidence)
            .await
            .map_err(Error::chain_read("waiting for worker activation"))?;
        if !lookup.receipt.is_success() {
            return Err(Error::init(
                worker,
                format!(
                    "activation message {id} failed with exit code {}",
                    lookup.receipt.exit_code
                ),
            ));
        }
        info!(%worker, height = lookup.height, "Worker activation confirmed");
        Ok(())
    }

    /// Restore a backed-up miner, report its deadline and park it again.
    pub async fn resume(&self, worker: &Address) -> Result<RunReport> {
        let mut run = Run::new(
            &self.runs,
            RunProtocol::Resume,
            worker.clone(),
            self.initial_state(worker),
        );
        let result = self.run_resume(&mut run).await;
        self.conclude(run, result).await
    }

    async fn run_resume(&self, run: &mut Run<'_>) -> Result<RunReport> {
        let worker = run.worker.clone();

        self.daemon
            .restore(&worker, &self.paths.backup_archive(&worker))
            .await?;
        if run.state == LifecycleState::Uninitialized {
            run.advance(LifecycleState::Initialized).await?;
        }

        let observation = self.run_daemon(run, Inspection::Classify).await?;

        let dest = self
            .paths
            .backup_dir(&worker)
            .join(format!("resume-{}", Utc::now().format("%Y%m%dT%H%M%SZ")));
        let relocated = self.daemon.relocate(&worker, &dest).await?;
        run.advance(LifecycleState::Relocated).await?;

        Ok(run.report(observation, None, None, Some(relocated)))
    }

    /// Back up an existing data directory without classifying it.
    pub async fn archive(&self, worker: &Address) -> Result<RunReport> {
        let mut run = Run::new(
            &self.runs,
            RunProtocol::Archive,
            worker.clone(),
            self.initial_state(worker),
        );
        let result = self.run_archive(&mut run).await;
        self.conclude(run, result).await
    }

    async fn run_archive(&self, run: &mut Run<'_>) -> Result<RunReport> {
        let worker = run.worker.clone();
        let backup_dir = self.paths.backup_dir(&worker);
        self.ensure_relocate_target_free(&worker, &backup_dir).await?;

        let observation = self.run_daemon(run, Inspection::MinerId).await?;

        self.back_up(run, Disposition::ArchiveOnly, &backup_dir)
            .await?;

        let relocated = self.daemon.relocate(&worker, &backup_dir).await?;
        run.advance(LifecycleState::Relocated).await?;

        Ok(run.report(
            observation,
            Some(Disposition::ArchiveOnly),
            Some(backup_dir),
            Some(relocated),
        ))
    }

    /// Fails before any backup or ledger write when the data directory could
    /// not be relocated into `dest` afterwards.
    async fn ensure_relocate_target_free(&self, worker: &Address, dest: &Path) -> Result<()> {
        let target = dest.join(RELOCATED_DIR_NAME);
        if tokio::fs::try_exists(&target).await.unwrap_or(true) {
            return Err(Error::relocate(
                &self.daemon.data_dir(worker),
                &target,
                "destination already exists",
            ));
        }
        Ok(())
    }

    async fn back_up(
        &self,
        run: &mut Run<'_>,
        disposition: Disposition,
        backup_dir: &Path,
    ) -> Result<()> {
        run.ensure(LifecycleState::BackedUp)?;
        self.ensure_relocate_target_free(&run.worker, backup_dir)
            .await?;
        self.daemon.backup(&run.worker, backup_dir).await?;
        run.advance(LifecycleState::BackedUp).await?;

        self.ledgers.append(disposition, &run.worker).await?;
        run.record(RunEvent::Disposition {
            disposition,
            backup_dir: backup_dir.to_path_buf(),
        })
        .await?;
        info!(
            worker = %run.worker,
            %disposition,
            ledger = %self.ledgers.path(disposition).display(),
            "Recorded disposition"
        );
        Ok(())
    }

    /// Start the daemon, inspect it, and stop it again whatever happened.
    async fn run_daemon(&self, run: &mut Run<'_>, inspection: Inspection) -> Result<Observation> {
        let worker = run.worker.clone();
        run.ensure(LifecycleState::Running)?;

        self.daemon.start(&worker).await?;

        let inspected = self.inspect(run, inspection).await;
        let stopped = self.daemon.stop(&worker).await;

        match (inspected, stopped) {
            (Ok(observation), Ok(())) => {
                run.advance(LifecycleState::Stopped).await?;
                Ok(observation)
            }
            (Ok(_), Err(stop_err)) => Err(stop_err),
            (Err(e), Ok(())) => {
                if let Err(ledger_err) = run.advance(LifecycleState::Stopped).await {
                    debug!("Could not record cleanup stop: {}", ledger_err);
                }
                Err(e)
            }
            (Err(e), Err(stop_err)) => {
                warn!(%worker, "Cleanup stop failed: {}", stop_err);
                Err(e)
            }
        }
    }

    async fn inspect(&self, run: &mut Run<'_>, inspection: Inspection) -> Result<Observation> {
        run.advance(LifecycleState::Running).await?;

        let miner = self
            .miner_api
            .actor_address()
            .await
            .map_err(Error::chain_read("reading miner actor address"))?;
        info!(worker = %run.worker, %miner, "Miner actor");
        run.miner = Some(miner.clone());

        if inspection == Inspection::MinerId {
            return Ok(Observation::default());
        }

        let deadline = self
            .gateway
            .miner_proving_deadline(&miner)
            .await
            .map_err(Error::chain_read("reading proving deadline"))?;
        let classification = self.classifier.classify(&deadline)?;
        info!(
            %miner,
            deadline_index = deadline.deadline_index,
            zeroth_open = %describe_epoch(
                self.classifier.clock(),
                deadline.current_epoch,
                classification.zeroth_open_epoch
            ),
            zeroth_deadline = %classification.zeroth_deadline,
            hour = classification.hour,
            window = %self.classifier.window(),
            disposition = %classification.disposition,
            "Classified miner"
        );
        run.classified(&classification).await?;

        Ok(Observation {
            deadline: Some(deadline),
            classification: Some(classification),
        })
    }
}
