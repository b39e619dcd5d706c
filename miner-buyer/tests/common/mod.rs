//! In-memory node, miner API and daemon for end-to-end runs.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chain_time::{
    DeadlineInfo, DeadlineWindowClassifier, EpochClock, ObserverZone, TimeWindow,
};
use lotus_gateway::{
    Address, ChainGateway, GatewayError, KeyType, Message, MessageId, MessageLookup, MinerApi,
    MinerInfo, TipSet, TokenAmount, VersionInfo, methods,
};
use miner_buyer::config::Paths;
use miner_buyer::daemon::{MinerDaemon, RELOCATED_DIR_NAME};
use miner_buyer::error::{Error, Result};
use miner_buyer::lifecycle::LifecycleOrchestrator;
use parking_lot::Mutex;
use tempfile::TempDir;

pub const OWNER: u64 = 100;
pub const MINER: u64 = 5000;
pub const CONFIDENCE: u64 = 5;

/// Epochs per hour on a 30 second clock.
const EPOCHS_PER_HOUR: i64 = 120;
/// Mainnet genesis is at 22:00 UTC.
const GENESIS_HOUR: i64 = 22;

fn rpc_error(message: impl Into<String>) -> GatewayError {
    GatewayError::Rpc {
        code: 1,
        message: message.into(),
    }
}

/// A snapshot whose zeroth deadline opens at `hour`:00 UTC, taken while
/// deadline 7 is active.
pub fn deadline_at_hour(hour: u32) -> DeadlineInfo {
    let day = 400 * 24 * EPOCHS_PER_HOUR;
    let zeroth = day + (i64::from(hour) - GENESIS_HOUR).rem_euclid(24) * EPOCHS_PER_HOUR;
    let open = zeroth + 7 * 60;
    DeadlineInfo {
        current_epoch: open + 12,
        period_open_epoch: zeroth,
        deadline_index: 7,
        deadline_open_epoch: open,
        deadline_close_epoch: open + 60,
        challenge_epoch: open - 20,
        fault_cutoff_epoch: open - 70,
        period_deadlines: 48,
        proving_period: 2880,
        challenge_window: 60,
    }
}

pub fn utc_classifier(start: u32, end: u32) -> DeadlineWindowClassifier {
    DeadlineWindowClassifier::new(
        EpochClock::MAINNET,
        TimeWindow::new(start, end).unwrap(),
        ObserverZone::Named(chrono_tz::UTC),
    )
}

/// Owner state of one miner actor.
#[derive(Debug, Clone)]
struct MinerState {
    owner: Address,
    pending: Option<Address>,
}

/// Decode the new-owner address out of `ChangeOwnerAddress` params.
fn decode_owner_param(params: &[u8]) -> Address {
    // one-byte CBOR header, protocol byte, then the uvarint id
    let mut id = 0u64;
    for (shift, byte) in params[2..].iter().enumerate() {
        id |= u64::from(byte & 0x7f) << (7 * shift);
        if byte & 0x80 == 0 {
            break;
        }
    }
    Address::new_id(id)
}

/// A node that applies messages as soon as they are submitted.
pub struct FakeChain {
    pub fee: Mutex<Option<TokenAmount>>,
    pub deadline: Mutex<Option<DeadlineInfo>>,
    /// Exit code of every message receipt.
    pub exit_code: Mutex<i64>,
    pub submitted: Mutex<Vec<Message>>,
    miners: Mutex<HashMap<Address, MinerState>>,
    next_key: AtomicU64,
}

impl FakeChain {
    pub fn new() -> Self {
        Self {
            fee: Mutex::new(Some(TokenAmount::from_atto(100))),
            deadline: Mutex::new(Some(deadline_at_hour(14))),
            exit_code: Mutex::new(0),
            submitted: Mutex::new(Vec::new()),
            miners: Mutex::new(HashMap::new()),
            next_key: AtomicU64::new(3000),
        }
    }

    pub fn add_miner(&self, miner: u64, owner: u64) {
        self.miners.lock().insert(
            Address::new_id(miner),
            MinerState {
                owner: Address::new_id(owner),
                pending: None,
            },
        );
    }

    pub fn owner_of(&self, miner: u64) -> Option<Address> {
        self.miners
            .lock()
            .get(&Address::new_id(miner))
            .map(|state| state.owner.clone())
    }

    pub fn submitted_methods(&self) -> Vec<u64> {
        self.submitted.lock().iter().map(|m| m.method).collect()
    }
}

#[async_trait]
impl ChainGateway for FakeChain {
    async fn chain_head(&self) -> lotus_gateway::Result<TipSet> {
        Ok(serde_json::from_value(serde_json::json!({
            "Cids": [{"/": "bafyhead"}],
            "Height": 1000,
        }))?)
    }

    async fn resolve_address(&self, addr: &Address) -> lotus_gateway::Result<Address> {
        Ok(addr.clone())
    }

    async fn wait_for_message(
        &self,
        id: &MessageId,
        _confirmations: u64,
    ) -> lotus_gateway::Result<MessageLookup> {
        Ok(serde_json::from_value(serde_json::json!({
            "Message": {"/": id.as_str()},
            "Receipt": {"ExitCode": *self.exit_code.lock(), "Return": null, "GasUsed": 1},
            "Height": 1001,
        }))?)
    }

    async fn estimate_fee_rate(
        &self,
        _lookahead: u64,
        _reference: &Address,
    ) -> lotus_gateway::Result<TokenAmount> {
        (*self.fee.lock()).ok_or_else(|| rpc_error("estimate unavailable"))
    }

    async fn miner_proving_deadline(&self, _miner: &Address) -> lotus_gateway::Result<DeadlineInfo> {
        (*self.deadline.lock()).ok_or_else(|| rpc_error("actor not found"))
    }

    async fn miner_info(&self, miner: &Address) -> lotus_gateway::Result<MinerInfo> {
        let miners = self.miners.lock();
        let state = miners
            .get(miner)
            .ok_or_else(|| rpc_error(format!("actor {miner} not found")))?;
        Ok(MinerInfo {
            owner: state.owner.clone(),
            worker: Address::new_id(1),
            pending_owner_address: state.pending.clone(),
            peer_id: None,
            sector_size: 34_359_738_368,
        })
    }

    async fn submit_message(&self, msg: Message) -> lotus_gateway::Result<MessageId> {
        let mut submitted = self.submitted.lock();
        let id = MessageId::new(format!("bafymsg{}", submitted.len() + 1));

        if msg.method == methods::CHANGE_OWNER_ADDRESS && *self.exit_code.lock() == 0 {
            let named = decode_owner_param(&msg.params);
            let mut miners = self.miners.lock();
            if let Some(state) = miners.get_mut(&msg.to) {
                if msg.from == state.owner {
                    state.pending = Some(named);
                } else if state.pending.as_ref() == Some(&msg.from) && msg.from == named {
                    state.owner = named;
                    state.pending = None;
                }
            }
        }

        submitted.push(msg);
        Ok(id)
    }

    async fn new_wallet_key(&self, _key_type: KeyType) -> lotus_gateway::Result<Address> {
        Ok(Address::new_id(self.next_key.fetch_add(1, Ordering::SeqCst)))
    }
}

/// Miner API of whichever daemon is currently running.
pub struct FakeMinerApi {
    pub miner: Mutex<Option<Address>>,
}

impl FakeMinerApi {
    pub fn new(miner: Option<u64>) -> Self {
        Self {
            miner: Mutex::new(miner.map(Address::new_id)),
        }
    }
}

#[async_trait]
impl MinerApi for FakeMinerApi {
    fn set_token(&self, _token: &str) {}

    async fn version(&self) -> lotus_gateway::Result<VersionInfo> {
        Ok(serde_json::from_value(serde_json::json!({
            "Version": "1.23.0+mainnet",
            "APIVersion": 67072,
            "BlockDelay": 30,
        }))?)
    }

    async fn actor_address(&self) -> lotus_gateway::Result<Address> {
        self.miner
            .lock()
            .clone()
            .ok_or_else(|| rpc_error("miner not running"))
    }
}

/// A daemon whose data directories are plain directories under the home prefix.
pub struct FakeDaemon {
    paths: Paths,
    pub calls: Mutex<Vec<String>>,
    /// Operation name (`start`, `stop`, `backup`, ...) that should fail.
    pub fail_on: Mutex<Option<&'static str>>,
}

impl FakeDaemon {
    pub fn new(paths: Paths) -> Self {
        Self {
            paths,
            calls: Mutex::new(Vec::new()),
            fail_on: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn enter(&self, op: &'static str, worker: &Address) -> Result<()> {
        self.calls.lock().push(op.to_string());
        if *self.fail_on.lock() == Some(op) {
            let reason = "injected failure";
            return Err(match op {
                "initialize" => Error::init(worker, reason),
                "restore" => Error::restore(worker, reason),
                "start" => Error::start(worker, reason),
                "stop" => Error::stop(worker, reason),
                "backup" => Error::backup(worker, reason),
                _ => Error::relocate(&self.data_dir(worker), &self.data_dir(worker), reason),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MinerDaemon for FakeDaemon {
    fn data_dir(&self, worker: &Address) -> PathBuf {
        self.paths.miner_dir(worker)
    }

    async fn initialize(&self, _owner: &Address, worker: &Address) -> Result<()> {
        self.enter("initialize", worker)?;
        std::fs::create_dir_all(self.data_dir(worker))?;
        Ok(())
    }

    async fn restore(&self, worker: &Address, archive: &Path) -> Result<()> {
        self.enter("restore", worker)?;
        if !self.data_dir(worker).exists() {
            if !archive.exists() {
                return Err(Error::restore(worker, "archive missing"));
            }
            std::fs::create_dir_all(self.data_dir(worker))?;
        }
        Ok(())
    }

    async fn start(&self, worker: &Address) -> Result<()> {
        self.enter("start", worker)
    }

    async fn stop(&self, worker: &Address) -> Result<()> {
        self.enter("stop", worker)
    }

    async fn backup(&self, worker: &Address, dest: &Path) -> Result<()> {
        self.enter("backup", worker)?;
        std::fs::create_dir_all(dest)?;
        std::fs::write(dest.join("bak"), b"archive")?;
        std::fs::write(dest.join("key"), b"7b7d")?;
        Ok(())
    }

    async fn relocate(&self, worker: &Address, dest: &Path) -> Result<PathBuf> {
        self.enter("relocate", worker)?;
        let target = dest.join(RELOCATED_DIR_NAME);
        std::fs::create_dir_all(dest)?;
        std::fs::rename(self.data_dir(worker), &target)?;
        Ok(target)
    }
}

/// A temporary home prefix with the three fakes wired into an orchestrator.
pub struct Harness {
    pub home: TempDir,
    pub paths: Paths,
    pub chain: Arc<FakeChain>,
    pub miner_api: Arc<FakeMinerApi>,
    pub daemon: Arc<FakeDaemon>,
    pub orchestrator: LifecycleOrchestrator,
}

impl Harness {
    pub fn new(window: (u32, u32)) -> Self {
        let home = TempDir::new().unwrap();
        let paths = Paths::new(home.path());
        let chain = Arc::new(FakeChain::new());
        chain.add_miner(MINER, OWNER);
        let miner_api = Arc::new(FakeMinerApi::new(Some(MINER)));
        let daemon = Arc::new(FakeDaemon::new(paths.clone()));

        let orchestrator = LifecycleOrchestrator::new(
            chain.clone(),
            miner_api.clone(),
            daemon.clone(),
            utc_classifier(window.0, window.1),
            paths.clone(),
            CONFIDENCE,
        );

        Self {
            home,
            paths,
            chain,
            miner_api,
            daemon,
            orchestrator,
        }
    }

    pub fn owner(&self) -> Address {
        Address::new_id(OWNER)
    }

    /// Lay out a backed-up worker the way a finished create run leaves it.
    pub fn seed_backup(&self, worker: &Address) {
        let dir = self.paths.backup_dir(worker);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(self.paths.backup_archive(worker), b"archive").unwrap();
    }

    pub fn ledger_lines(&self, file: &str) -> Vec<String> {
        std::fs::read_to_string(self.paths.home().join(file))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
