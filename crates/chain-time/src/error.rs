//! Chain-time error types.

use thiserror::Error;

use crate::ChainEpoch;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, TimeError>;

/// Errors produced while deriving wall-clock values from chain data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    /// The deadline index does not address a deadline of the proving period.
    #[error("Invalid deadline: index {index} outside of [0, {deadlines})")]
    DeadlineIndexOutOfRange { index: u64, deadlines: u64 },

    /// The computed epoch lies before genesis.
    #[error("Invalid deadline: epoch {epoch} is before genesis")]
    BeforeGenesis { epoch: ChainEpoch },

    /// Arithmetic on the schedule overflowed.
    #[error("Invalid deadline: epoch arithmetic overflowed")]
    Overflow,

    /// A wall-clock time string could not be parsed.
    #[error("Invalid time of day: {0}")]
    InvalidTimeOfDay(String),

    /// An observer time zone name could not be parsed.
    #[error("Invalid time zone: {0}")]
    InvalidTimeZone(String),
}

impl TimeError {
    /// Whether the error stems from malformed schedule data.
    pub fn is_invalid_deadline(&self) -> bool {
        matches!(
            self,
            Self::DeadlineIndexOutOfRange { .. } | Self::BeforeGenesis { .. } | Self::Overflow
        )
    }
}
