//! Disposition buckets.

use serde::{Deserialize, Serialize};

/// What to do with a miner once its lifecycle run completes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposition {
    /// Zeroth deadline falls inside the configured window.
    Keep,
    /// Zeroth deadline falls outside the configured window.
    Sell,
    /// Backed up without any classification.
    ArchiveOnly,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keep => "KEEP",
            Self::Sell => "SELL",
            Self::ArchiveOnly => "ARCHIVE_ONLY",
        }
    }

    /// File name of the flat ledger this disposition is recorded in.
    pub fn ledger_file_name(&self) -> &'static str {
        match self {
            Self::Keep => "keepminer.list",
            Self::Sell => "sellminer.list",
            Self::ArchiveOnly => "backupminer.list",
        }
    }
}
