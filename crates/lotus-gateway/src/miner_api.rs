//! The storage-miner daemon's own RPC surface.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::address::Address;
use crate::error::Result;
use crate::rpc::JsonRpcClient;

/// Version triple the daemon reports.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionInfo {
    pub version: String,
    #[serde(rename = "APIVersion", default)]
    pub api_version: u64,
    #[serde(default)]
    pub block_delay: u64,
}

#[async_trait]
pub trait MinerApi: Send + Sync {
    /// Replace the bearer token, read from the daemon's data directory.
    fn set_token(&self, token: &str);

    /// Cheapest authenticated call; used as the readiness probe.
    async fn version(&self) -> Result<VersionInfo>;

    /// The miner actor this daemon runs.
    async fn actor_address(&self) -> Result<Address>;
}

/// [`MinerApi`] over JSON-RPC.
pub struct MinerRpcClient {
    rpc: JsonRpcClient,
}

impl MinerRpcClient {
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self> {
        Ok(Self {
            rpc: JsonRpcClient::new(endpoint, token)?,
        })
    }

    pub fn url(&self) -> &str {
        self.rpc.url()
    }
}

#[async_trait]
impl MinerApi for MinerRpcClient {
    fn set_token(&self, token: &str) {
        self.rpc.set_token(token);
    }

    async fn version(&self) -> Result<VersionInfo> {
        self.rpc.request("Filecoin.Version", json!([])).await
    }

    async fn actor_address(&self) -> Result<Address> {
        self.rpc.request("Filecoin.ActorAddress", json!([])).await
    }
}
