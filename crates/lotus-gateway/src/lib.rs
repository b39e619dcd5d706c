//! Lotus gateway: the narrow slice of the Filecoin node APIs the miner tooling needs.
//!
//! ## Core Types
//!
//! - [`Address`] - Validated chain address
//! - [`TokenAmount`] - Amount in attoFIL, parsed from human strings like `2 FIL`
//! - [`Message`] / [`MessageId`] / [`MessageLookup`] - Submission and receipts
//! - [`MinerInfo`] - On-chain miner actor metadata
//!
//! ## Traits
//!
//! - [`ChainGateway`] - Full-node reads, fee estimation, message submission
//! - [`MinerApi`] - The storage-miner daemon's own RPC surface
//!
//! ## Clients
//!
//! - [`LotusClient`] - [`ChainGateway`] over JSON-RPC/HTTP
//! - [`MinerRpcClient`] - [`MinerApi`] over JSON-RPC/HTTP

pub mod address;
pub mod error;
pub mod gateway;
pub mod message;
pub mod miner_api;
pub mod rpc;
pub mod token;

pub use address::{Address, Protocol};
pub use error::{GatewayError, Result};
pub use gateway::{ChainGateway, LotusClient};
pub use message::{
    CidLink, KeyType, Message, MessageId, MessageLookup, MinerInfo, Receipt, TipSet, methods,
};
pub use miner_api::{MinerApi, MinerRpcClient, VersionInfo};
pub use rpc::{JsonRpcClient, endpoint_url};
pub use token::TokenAmount;

pub use chain_time::DeadlineInfo;
