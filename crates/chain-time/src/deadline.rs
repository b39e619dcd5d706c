//! Proving deadline snapshots.

use serde::{Deserialize, Serialize};

use crate::epoch::ChainEpoch;
use crate::error::{Result, TimeError};

/// Number of deadlines in a proving period when the chain does not report it.
pub const DEFAULT_PERIOD_DEADLINES: u64 = 48;

/// Length of one challenge window, in epochs, when the chain does not report it.
pub const DEFAULT_CHALLENGE_WINDOW: ChainEpoch = 60;

/// Snapshot of a miner's current proving deadline.
///
/// Field names on the wire follow the full-node JSON encoding. The snapshot is
/// read-only: everything the classifier needs is derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineInfo {
    /// Epoch at which this snapshot was taken.
    #[serde(rename = "CurrentEpoch")]
    pub current_epoch: ChainEpoch,
    /// First epoch of the current proving period.
    #[serde(rename = "PeriodStart")]
    pub period_open_epoch: ChainEpoch,
    /// Index of the currently active deadline within the period.
    #[serde(rename = "Index")]
    pub deadline_index: u64,
    /// First epoch in which a proof may be submitted for this deadline.
    #[serde(rename = "Open")]
    pub deadline_open_epoch: ChainEpoch,
    /// First epoch after which proofs are no longer accepted.
    #[serde(rename = "Close")]
    pub deadline_close_epoch: ChainEpoch,
    /// Epoch at which the randomness for the challenge is drawn.
    #[serde(rename = "Challenge")]
    pub challenge_epoch: ChainEpoch,
    /// Last epoch at which a fault declaration is accepted.
    #[serde(rename = "FaultCutoff")]
    pub fault_cutoff_epoch: ChainEpoch,
    #[serde(rename = "WPoStPeriodDeadlines", default)]
    pub period_deadlines: u64,
    #[serde(rename = "WPoStProvingPeriod", default)]
    pub proving_period: ChainEpoch,
    #[serde(rename = "WPoStChallengeWindow", default)]
    pub challenge_window: ChainEpoch,
}

impl DeadlineInfo {
    /// Deadlines per proving period, falling back to the network default.
    pub fn deadlines_per_period(&self) -> u64 {
        if self.period_deadlines == 0 {
            DEFAULT_PERIOD_DEADLINES
        } else {
            self.period_deadlines
        }
    }

    /// Challenge window length in epochs, falling back to the network default.
    pub fn challenge_window_epochs(&self) -> ChainEpoch {
        if self.challenge_window <= 0 {
            DEFAULT_CHALLENGE_WINDOW
        } else {
            self.challenge_window
        }
    }

    /// Opening epoch of deadline 0 of the current proving period.
    ///
    /// Walks back from the active deadline's opening epoch by `deadline_index`
    /// challenge windows. The answer does not depend on which deadline is
    /// currently active.
    pub fn zeroth_open_epoch(&self) -> Result<ChainEpoch> {
        let deadlines = self.deadlines_per_period();
        if self.deadline_index >= deadlines {
            return Err(TimeError::DeadlineIndexOutOfRange {
                index: self.deadline_index,
                deadlines,
            });
        }

        let index = ChainEpoch::try_from(self.deadline_index).map_err(|_| TimeError::Overflow)?;
        let offset = index
            .checked_mul(self.challenge_window_epochs())
            .ok_or(TimeError::Overflow)?;

        let back = self
            .current_epoch
            .checked_sub(self.deadline_open_epoch)
            .and_then(|d| d.checked_add(offset))
            .ok_or(TimeError::Overflow)?;
        let epoch = self
            .current_epoch
            .checked_sub(back)
            .ok_or(TimeError::Overflow)?;

        if epoch < 0 {
            return Err(TimeError::BeforeGenesis { epoch });
        }
        Ok(epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn info(period_start: ChainEpoch, index: u64, offset: ChainEpoch) -> DeadlineInfo {
        let open = period_start + index as ChainEpoch * DEFAULT_CHALLENGE_WINDOW;
        DeadlineInfo {
            current_epoch: open + offset,
            period_open_epoch: period_start,
            deadline_index: index,
            deadline_open_epoch: open,
            deadline_close_epoch: open + DEFAULT_CHALLENGE_WINDOW,
            challenge_epoch: open - 20,
            fault_cutoff_epoch: open - 70,
            period_deadlines: DEFAULT_PERIOD_DEADLINES,
            proving_period: 2880,
            challenge_window: DEFAULT_CHALLENGE_WINDOW,
        }
    }

    #[test]
    fn test_parse_full_node_json() {
        let json = r#"{
            "CurrentEpoch": 1000123,
            "PeriodStart": 999360,
            "Index": 12,
            "Open": 1000080,
            "Close": 1000140,
            "Challenge": 1000060,
            "FaultCutoff": 1000010,
            "WPoStPeriodDeadlines": 48,
            "WPoStProvingPeriod": 2880,
            "WPoStChallengeWindow": 60,
            "WPoStChallengeLookback": 20,
            "FaultDeclarationCutoff": 70
        }"#;

        let info: DeadlineInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.current_epoch, 1_000_123);
        assert_eq!(info.deadline_index, 12);
        assert_eq!(info.zeroth_open_epoch().unwrap(), 999_360);
    }

    #[test]
    fn test_missing_schedule_parameters_use_defaults() {
        let json = r#"{
            "CurrentEpoch": 200, "PeriodStart": 80, "Index": 2,
            "Open": 200, "Close": 260, "Challenge": 180, "FaultCutoff": 130
        }"#;
        let info: DeadlineInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.deadlines_per_period(), DEFAULT_PERIOD_DEADLINES);
        assert_eq!(info.challenge_window_epochs(), DEFAULT_CHALLENGE_WINDOW);
        assert_eq!(info.zeroth_open_epoch().unwrap(), 80);
    }

    #[test]
    fn test_index_out_of_range() {
        let mut bad = info(0, 0, 0);
        bad.deadline_index = 48;
        assert_eq!(
            bad.zeroth_open_epoch().unwrap_err(),
            TimeError::DeadlineIndexOutOfRange {
                index: 48,
                deadlines: 48
            }
        );
    }

    #[test]
    fn test_corrupted_period_before_genesis() {
        let mut bad = info(0, 3, 5);
        bad.deadline_open_epoch = 10;
        let err = bad.zeroth_open_epoch().unwrap_err();
        assert_eq!(err, TimeError::BeforeGenesis { epoch: -170 });
        assert!(err.is_invalid_deadline());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_zeroth_open_is_period_start(
            period_start in 0i64..50_000_000,
            index in 0u64..DEFAULT_PERIOD_DEADLINES,
            offset in 0i64..DEFAULT_CHALLENGE_WINDOW,
        ) {
            let info = info(period_start, index, offset);
            let zeroth = info.zeroth_open_epoch().unwrap();
            prop_assert_eq!(zeroth, period_start);
            prop_assert!(zeroth <= info.current_epoch);
            prop_assert_eq!(info.zeroth_open_epoch().unwrap(), zeroth);
        }
    }
}
