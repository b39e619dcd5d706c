//! Chain addresses.
//!
//! Addresses are kept in their textual form (`f01234`, `t3abc...`). Only ID
//! addresses are ever encoded to bytes here, since they are the only kind the
//! tooling puts into message parameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Address protocol, the digit following the network prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Protocol {
    Id,
    Secp256k1,
    Actor,
    Bls,
    Delegated,
}

impl Protocol {
    fn from_digit(c: char) -> Option<Self> {
        match c {
            '0' => Some(Self::Id),
            '1' => Some(Self::Secp256k1),
            '2' => Some(Self::Actor),
            '3' => Some(Self::Bls),
            '4' => Some(Self::Delegated),
            _ => None,
        }
    }
}

/// A validated chain address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and validate an address string.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let trimmed = value.trim();

        let mut chars = trimmed.chars();
        match chars.next() {
            Some('f' | 't') => {}
            _ => {
                return Err(GatewayError::invalid_address(format!(
                    "{trimmed:?}: unknown network prefix"
                )));
            }
        }
        let protocol = chars
            .next()
            .and_then(Protocol::from_digit)
            .ok_or_else(|| {
                GatewayError::invalid_address(format!("{trimmed:?}: unknown protocol"))
            })?;

        let payload = chars.as_str();
        if payload.is_empty() {
            return Err(GatewayError::invalid_address(format!(
                "{trimmed:?}: empty payload"
            )));
        }

        let valid = match protocol {
            Protocol::Id => payload.parse::<u64>().is_ok(),
            _ => payload
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()),
        };
        if !valid {
            return Err(GatewayError::invalid_address(format!(
                "{trimmed:?}: malformed {protocol} payload"
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Mainnet ID address for `id`.
    pub fn new_id(id: u64) -> Self {
        Self(format!("f0{id}"))
    }

    /// The system actor, used as a neutral reference sender for estimates.
    pub fn system_actor() -> Self {
        Self::new_id(0)
    }

    pub fn protocol(&self) -> Protocol {
        // validated on construction
        self.0
            .chars()
            .nth(1)
            .and_then(Protocol::from_digit)
            .unwrap_or(Protocol::Id)
    }

    /// Numeric actor id, for ID addresses.
    pub fn id(&self) -> Option<u64> {
        match self.protocol() {
            Protocol::Id => self.0[2..].parse().ok(),
            _ => None,
        }
    }

    /// Binary encoding (protocol byte + uvarint id), for ID addresses.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let id = self.id().ok_or_else(|| {
            GatewayError::invalid_address(format!("{self}: only ID addresses can be encoded"))
        })?;
        let mut out = vec![0u8];
        write_uvarint(&mut out, id);
        Ok(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn write_uvarint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Address {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
