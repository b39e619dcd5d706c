//! FIL amounts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{GatewayError, Result};

/// attoFIL per FIL.
const FIL_PRECISION: u32 = 18;

/// Unit suffixes and their power of ten relative to attoFIL.
///
/// Longer suffixes come first so that `attofil` is not mistaken for `fil`.
const UNITS: [(&str, u32); 8] = [
    ("attofil", 0),
    ("femtofil", 3),
    ("picofil", 6),
    ("nanofil", 9),
    ("microfil", 12),
    ("millifil", 15),
    ("afil", 0),
    ("fil", FIL_PRECISION),
];

/// An amount of FIL, stored in attoFIL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(u128);

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(0);

    pub const fn from_atto(atto: u128) -> Self {
        Self(atto)
    }

    /// Whole FIL.
    pub fn from_whole(fil: u64) -> Self {
        Self(u128::from(fil) * 10u128.pow(FIL_PRECISION))
    }

    pub const fn atto(&self) -> u128 {
        self.0
    }

    /// Parse `2 FIL`, `0.5fil`, `150 nanoFIL`, `1000 attoFIL` or a bare FIL
    /// decimal such as `0.25`.
    pub fn parse(input: &str) -> Result<Self> {
        let lowered = input.trim().to_ascii_lowercase();
        let (number, exponent) = UNITS
            .iter()
            .find_map(|(suffix, exp)| lowered.strip_suffix(suffix).map(|n| (n.trim(), *exp)))
            .unwrap_or((lowered.as_str(), FIL_PRECISION));

        if number.is_empty() {
            return Err(GatewayError::invalid_amount(format!("{input:?}: missing value")));
        }

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        let digits_ok = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if !digits_ok(whole) || !digits_ok(fraction) || (whole.is_empty() && fraction.is_empty())
        {
            return Err(GatewayError::invalid_amount(format!("{input:?}: not a number")));
        }
        let fraction = fraction.trim_end_matches('0');
        if fraction.len() > exponent as usize {
            return Err(GatewayError::invalid_amount(format!(
                "{input:?}: more precision than one attoFIL"
            )));
        }

        let overflow = || GatewayError::invalid_amount(format!("{input:?}: value too large"));
        let scale = 10u128.pow(exponent);
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let fraction_atto: u128 = if fraction.is_empty() {
            0
        } else {
            let padded = format!("{fraction:0<width$}", width = exponent as usize);
            padded.parse().map_err(|_| overflow())?
        };

        whole
            .checked_mul(scale)
            .and_then(|v| v.checked_add(fraction_atto))
            .map(Self)
            .ok_or_else(overflow)
    }
}

impl fmt::Display for TokenAmount {
    /// Renders as a trimmed FIL decimal, e.g. `0.5 FIL`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = 10u128.pow(FIL_PRECISION);
        let whole = self.0 / scale;
        let fraction = self.0 % scale;
        if fraction == 0 {
            write!(f, "{whole} FIL")
        } else {
            let digits = format!("{fraction:0>width$}", width = FIL_PRECISION as usize);
            write!(f, "{whole}.{} FIL", digits.trim_end_matches('0'))
        }
    }
}

impl FromStr for TokenAmount {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// On the wire amounts are attoFIL integers encoded as JSON strings.
impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s
                .trim()
                .parse::<u128>()
                .map(Self)
                .map_err(serde::de::Error::custom),
            Raw::Number(n) => Ok(Self(u128::from(n))),
        }
    }
}
