//! Messages, receipts and chain metadata in the full-node JSON encoding.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::address::Address;
use crate::error::Result;
use crate::token::TokenAmount;

/// Actor method numbers used by this crate.
pub mod methods {
    /// Plain value transfer.
    pub const SEND: u64 = 0;
    /// Miner actor: propose or confirm a new owner.
    pub const CHANGE_OWNER_ADDRESS: u64 = 23;
}

/// Content identifier of a submitted message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(cid: impl Into<String>) -> Self {
        Self(cid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// IPLD link as the node encodes it: `{"/": "bafy..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidLink {
    #[serde(rename = "/")]
    pub cid: String,
}

impl From<&MessageId> for CidLink {
    fn from(id: &MessageId) -> Self {
        Self { cid: id.0.clone() }
    }
}

/// Unsigned message handed to the node for gas estimation, signing and
/// publishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Message {
    pub version: u64,
    pub to: Address,
    pub from: Address,
    pub nonce: u64,
    pub value: TokenAmount,
    pub gas_limit: i64,
    pub gas_fee_cap: TokenAmount,
    pub gas_premium: TokenAmount,
    pub method: u64,
    #[serde(serialize_with = "serialize_bytes")]
    pub params: Vec<u8>,
}

impl Message {
    /// Message with zeroed gas fields; the node fills them in on push.
    pub fn new(from: Address, to: Address, method: u64) -> Self {
        Self {
            version: 0,
            to,
            from,
            nonce: 0,
            value: TokenAmount::ZERO,
            gas_limit: 0,
            gas_fee_cap: TokenAmount::ZERO,
            gas_premium: TokenAmount::ZERO,
            method,
            params: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: TokenAmount) -> Self {
        self.value = value;
        self
    }

    pub fn with_params(mut self, params: Vec<u8>) -> Self {
        self.params = params;
        self
    }

    /// Value transfer from `from` to `to`.
    pub fn send(from: Address, to: Address, value: TokenAmount) -> Self {
        Self::new(from, to, methods::SEND).with_value(value)
    }

    /// `ChangeOwnerAddress` on `miner`, naming `new_owner` (an ID address).
    pub fn change_owner(from: Address, miner: Address, new_owner: &Address) -> Result<Self> {
        let params = cbor_byte_string(&new_owner.to_bytes()?);
        Ok(Self::new(from, miner, methods::CHANGE_OWNER_ADDRESS).with_params(params))
    }
}

/// CBOR major type 2 (byte string) encoding of `bytes`.
pub fn cbor_byte_string(bytes: &[u8]) -> Vec<u8> {
    let len = bytes.len();
    let mut out = Vec::with_capacity(len + 9);
    match len {
        0..=23 => out.push(0x40 | len as u8),
        24..=0xff => out.extend_from_slice(&[0x58, len as u8]),
        0x100..=0xffff => {
            out.push(0x59);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        }
        _ => {
            out.push(0x5a);
            out.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }
    out.extend_from_slice(bytes);
    out
}

fn serialize_bytes<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    if bytes.is_empty() {
        serializer.serialize_none()
    } else {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }
}

fn deserialize_bytes<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<u8>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(Vec::new()),
        Some(s) => STANDARD.decode(s).map_err(serde::de::Error::custom),
    }
}

/// Signed message as returned by `MpoolPushMessage`; only the CID matters here.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SignedMessage {
    #[serde(rename = "CID")]
    pub cid: CidLink,
}

/// Execution receipt of an included message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Receipt {
    pub exit_code: i64,
    #[serde(default, deserialize_with = "deserialize_bytes", serialize_with = "serialize_bytes")]
    pub r#return: Vec<u8>,
    #[serde(default)]
    pub gas_used: i64,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Result of waiting for a message to be included and confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageLookup {
    pub message: CidLink,
    pub receipt: Receipt,
    #[serde(default)]
    pub height: i64,
}

/// Chain head tip-set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TipSet {
    pub cids: Vec<CidLink>,
    pub height: i64,
}

/// Miner actor metadata (subset).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MinerInfo {
    pub owner: Address,
    pub worker: Address,
    #[serde(default)]
    pub pending_owner_address: Option<Address>,
    #[serde(default)]
    pub peer_id: Option<String>,
    #[serde(default)]
    pub sector_size: u64,
}

/// Wallet key type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum KeyType {
    Bls,
    Secp256k1,
}
