//! Epoch clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TimeError};

/// Discrete chain time unit.
pub type ChainEpoch = i64;

/// Converts epochs into absolute timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochClock {
    /// Unix timestamp (seconds) of epoch 0.
    pub genesis_unix: i64,
    /// Seconds between two consecutive epochs.
    pub block_delay_secs: i64,
}

impl EpochClock {
    /// Filecoin mainnet: genesis at 2020-08-24T22:00:00Z, 30 second epochs.
    pub const MAINNET: EpochClock = EpochClock {
        genesis_unix: 1_598_306_400,
        block_delay_secs: 30,
    };

    pub const fn new(genesis_unix: i64, block_delay_secs: i64) -> Self {
        Self {
            genesis_unix,
            block_delay_secs,
        }
    }

    /// Seconds elapsed between genesis and `epoch`.
    pub fn seconds_since_genesis(&self, epoch: ChainEpoch) -> Result<i64> {
        if epoch < 0 {
            return Err(TimeError::BeforeGenesis { epoch });
        }
        epoch
            .checked_mul(self.block_delay_secs)
            .ok_or(TimeError::Overflow)
    }

    /// Absolute timestamp at which `epoch` starts.
    pub fn timestamp(&self, epoch: ChainEpoch) -> Result<DateTime<Utc>> {
        let secs = self
            .seconds_since_genesis(epoch)?
            .checked_add(self.genesis_unix)
            .ok_or(TimeError::Overflow)?;
        DateTime::from_timestamp(secs, 0).ok_or(TimeError::Overflow)
    }
}

impl Default for EpochClock {
    fn default() -> Self {
        Self::MAINNET
    }
}

/// Render `epoch` relative to `current`, e.g. `1234 (in 2h 30m)`.
pub fn describe_epoch(clock: &EpochClock, current: ChainEpoch, epoch: ChainEpoch) -> String {
    let delta = (epoch - current).saturating_mul(clock.block_delay_secs);
    match delta {
        0 => format!("{epoch} (now)"),
        d if d > 0 => format!("{epoch} (in {})", format_duration_short(d.unsigned_abs())),
        d => format!("{epoch} ({} ago)", format_duration_short(d.unsigned_abs())),
    }
}

/// Format a duration with its two most significant non-zero units.
pub fn format_duration_short(secs: u64) -> String {
    const UNITS: [(u64, &str); 4] = [(86_400, "d"), (3_600, "h"), (60, "m"), (1, "s")];

    if secs == 0 {
        return "0s".to_string();
    }

    let mut rest = secs;
    let mut parts = Vec::with_capacity(2);
    for (size, suffix) in UNITS {
        let value = rest / size;
        rest %= size;
        if value > 0 {
            parts.push(format!("{value}{suffix}"));
        } else if !parts.is_empty() {
            // a zero unit after the first significant one ends the rendering
            break;
        }
        if parts.len() == 2 {
            break;
        }
    }
    parts.join(" ")
}
