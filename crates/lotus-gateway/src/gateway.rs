//! Full-node access.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::address::Address;
use crate::error::Result;
use crate::message::{KeyType, Message, MessageId, MessageLookup, MinerInfo, SignedMessage, TipSet};
use crate::rpc::JsonRpcClient;
use crate::token::TokenAmount;
use chain_time::DeadlineInfo;

/// Gas limit assumed when asking for a premium estimate.
const ESTIMATE_GAS_LIMIT: i64 = 10_000;

/// `StateWaitMsg` lookback: search the whole chain.
const LOOKBACK_NO_LIMIT: i64 = -1;

/// `StateWaitMsg` blocks until inclusion plus the requested confirmations.
const WAIT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Operations against a full node.
///
/// Everything the lifecycle and transfer workflows need from the chain goes
/// through this trait, so they can run against an in-memory node in tests.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    async fn chain_head(&self) -> Result<TipSet>;

    /// Resolve any address to its ID address.
    async fn resolve_address(&self, addr: &Address) -> Result<Address>;

    /// Block until `id` is included and has `confirmations` epochs on top.
    async fn wait_for_message(&self, id: &MessageId, confirmations: u64) -> Result<MessageLookup>;

    /// Gas premium estimate for inclusion within `lookahead` blocks.
    async fn estimate_fee_rate(&self, lookahead: u64, reference: &Address) -> Result<TokenAmount>;

    async fn miner_proving_deadline(&self, miner: &Address) -> Result<DeadlineInfo>;

    async fn miner_info(&self, miner: &Address) -> Result<MinerInfo>;

    /// Let the node fill in gas and nonce, sign with `msg.from` and publish.
    async fn submit_message(&self, msg: Message) -> Result<MessageId>;

    async fn new_wallet_key(&self, key_type: KeyType) -> Result<Address>;
}

/// [`ChainGateway`] over the full node's JSON-RPC API.
pub struct LotusClient {
    rpc: JsonRpcClient,
}

impl LotusClient {
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self> {
        let rpc = JsonRpcClient::new(endpoint, token)?;
        debug!(url = %rpc.url(), "Full node client configured");
        Ok(Self { rpc })
    }

    pub fn url(&self) -> &str {
        self.rpc.url()
    }
}

/// The empty tip-set key, meaning "at the current head".
fn head_key() -> Value {
    json!([])
}

#[async_trait]
impl ChainGateway for LotusClient {
    async fn chain_head(&self) -> Result<TipSet> {
        self.rpc.request("Filecoin.ChainHead", json!([])).await
    }

    async fn resolve_address(&self, addr: &Address) -> Result<Address> {
        self.rpc
            .request("Filecoin.StateLookupID", json!([addr, head_key()]))
            .await
    }

    async fn wait_for_message(&self, id: &MessageId, confirmations: u64) -> Result<MessageLookup> {
        debug!(cid = %id, confirmations, "Waiting for message");
        let cid = crate::message::CidLink::from(id);
        self.rpc
            .request_with_timeout(
                "Filecoin.StateWaitMsg",
                json!([cid, confirmations, LOOKBACK_NO_LIMIT, true]),
                WAIT_MESSAGE_TIMEOUT,
            )
            .await
    }

    async fn estimate_fee_rate(&self, lookahead: u64, reference: &Address) -> Result<TokenAmount> {
        self.rpc
            .request(
                "Filecoin.GasEstimateGasPremium",
                json!([lookahead, reference, ESTIMATE_GAS_LIMIT, head_key()]),
            )
            .await
    }

    async fn miner_proving_deadline(&self, miner: &Address) -> Result<DeadlineInfo> {
        let head = self.chain_head().await?;
        debug!(%miner, height = head.height, "Reading proving deadline");
        self.rpc
            .request(
                "Filecoin.StateMinerProvingDeadline",
                json!([miner, head.cids]),
            )
            .await
    }

    async fn miner_info(&self, miner: &Address) -> Result<MinerInfo> {
        self.rpc
            .request("Filecoin.StateMinerInfo", json!([miner, head_key()]))
            .await
    }

    async fn submit_message(&self, msg: Message) -> Result<MessageId> {
        let signed: SignedMessage = self
            .rpc
            .request("Filecoin.MpoolPushMessage", json!([msg, Value::Null]))
            .await?;
        Ok(MessageId::new(signed.cid.cid))
    }

    async fn new_wallet_key(&self, key_type: KeyType) -> Result<Address> {
        self.rpc.request("Filecoin.WalletNew", json!([key_type])).await
    }
}
