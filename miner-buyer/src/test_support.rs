//! Mocks of the node-facing traits for unit tests.

use async_trait::async_trait;
use chain_time::DeadlineInfo;
use lotus_gateway::{
    Address, ChainGateway, KeyType, Message, MessageId, MessageLookup, MinerApi, MinerInfo,
    Result, TipSet, TokenAmount, VersionInfo,
};
use mockall::mock;

mock! {
    pub Gateway {}

    #[async_trait]
    impl ChainGateway for Gateway {
        async fn chain_head(&self) -> Result<TipSet>;
        async fn resolve_address(&self, addr: &Address) -> Result<Address>;
        async fn wait_for_message(&self, id: &MessageId, confirmations: u64) -> Result<MessageLookup>;
        async fn estimate_fee_rate(&self, lookahead: u64, reference: &Address) -> Result<TokenAmount>;
        async fn miner_proving_deadline(&self, miner: &Address) -> Result<DeadlineInfo>;
        async fn miner_info(&self, miner: &Address) -> Result<MinerInfo>;
        async fn submit_message(&self, msg: Message) -> Result<MessageId>;
        async fn new_wallet_key(&self, key_type: KeyType) -> Result<Address>;
    }
}

mock! {
    pub Miner {}

    #[async_trait]
    impl MinerApi for Miner {
        fn set_token(&self, token: &str);
        async fn version(&self) -> Result<VersionInfo>;
        async fn actor_address(&self) -> Result<Address>;
    }
}

/// A successful lookup for `cid`.
pub fn lookup(cid: &str, exit_code: i64) -> MessageLookup {
    serde_json::from_value(serde_json::json!({
        "Message": {"/": cid},
        "Receipt": {"ExitCode": exit_code, "Return": null, "GasUsed": 1},
        "Height": 100,
    }))
    .unwrap()
}

pub fn miner_info(owner: u64, pending: Option<u64>) -> MinerInfo {
    MinerInfo {
        owner: Address::new_id(owner),
        worker: Address::new_id(owner + 1),
        pending_owner_address: pending.map(Address::new_id),
        peer_id: None,
        sector_size: 34_359_738_368,
    }
}
