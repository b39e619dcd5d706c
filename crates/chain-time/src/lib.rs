//! Chain-time: converts an epoch-based proving schedule into wall-clock decisions.
//!
//! The chain measures time in epochs. A fixed genesis timestamp and a fixed
//! block interval turn an epoch into an absolute instant, which is what an
//! operator reasons about when deciding whether a miner's proving window falls
//! into working hours.
//!
//! ## Core Types
//!
//! - [`EpochClock`] - Genesis timestamp + block interval
//! - [`DeadlineInfo`] - Snapshot of a miner's current proving deadline
//! - [`TimeWindow`] - Inclusive daily window of wall-clock hours
//! - [`Disposition`] - Keep / sell / archive bucket
//! - [`DeadlineWindowClassifier`] - Maps a deadline snapshot to a disposition

pub mod classifier;
pub mod deadline;
pub mod disposition;
pub mod epoch;
pub mod error;
pub mod window;

pub use classifier::{Classification, DeadlineWindowClassifier, ObserverZone};
pub use deadline::{
    DEFAULT_CHALLENGE_WINDOW, DEFAULT_PERIOD_DEADLINES, DeadlineInfo,
};
pub use disposition::Disposition;
pub use epoch::{ChainEpoch, EpochClock, describe_epoch, format_duration_short};
pub use error::{Result, TimeError};
pub use window::TimeWindow;
