//! Deadline window classification.
//!
//! Turns a [`DeadlineInfo`] snapshot into the wall-clock hour at which the
//! zeroth deadline of the current proving period opens, and buckets that hour
//! against a [`TimeWindow`]. Everything here is pure: the same inputs always
//! produce the same [`Classification`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::deadline::DeadlineInfo;
use crate::disposition::Disposition;
use crate::epoch::{ChainEpoch, EpochClock};
use crate::error::{Result, TimeError};
use crate::window::TimeWindow;

/// Time zone in which wall-clock hours are observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObserverZone {
    /// The host's local zone.
    #[default]
    Local,
    /// A named IANA zone.
    Named(Tz),
}

impl ObserverZone {
    /// Hour of day of `instant` in this zone.
    pub fn hour_of(&self, instant: DateTime<Utc>) -> u32 {
        match self {
            Self::Local => instant.with_timezone(&Local).hour(),
            Self::Named(tz) => instant.with_timezone(tz).hour(),
        }
    }
}

impl FromStr for ObserverZone {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        s.parse::<Tz>()
            .map(Self::Named)
            .map_err(|_| TimeError::InvalidTimeZone(s.to_string()))
    }
}

impl fmt::Display for ObserverZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Named(tz) => write!(f, "{}", tz.name()),
        }
    }
}

/// Result of classifying one deadline snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub zeroth_open_epoch: ChainEpoch,
    pub zeroth_deadline: DateTime<Utc>,
    /// Hour of day of `zeroth_deadline` in the observer zone.
    pub hour: u32,
    pub disposition: Disposition,
}

/// Classifies miners by when their zeroth proving deadline opens.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineWindowClassifier {
    clock: EpochClock,
    window: TimeWindow,
    zone: ObserverZone,
}

impl DeadlineWindowClassifier {
    pub fn new(clock: EpochClock, window: TimeWindow, zone: ObserverZone) -> Self {
        Self {
            clock,
            window,
            zone,
        }
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn clock(&self) -> &EpochClock {
        &self.clock
    }

    /// Absolute instant at which deadline 0 of the current period opens.
    pub fn zeroth_deadline_wall_clock(&self, info: &DeadlineInfo) -> Result<DateTime<Utc>> {
        let epoch = info.zeroth_open_epoch()?;
        self.clock.timestamp(epoch)
    }

    /// Keep when `hour` is inside the window, sell otherwise.
    pub fn classify_hour(&self, hour: u32) -> Disposition {
        if self.window.contains(hour) {
            Disposition::Keep
        } else {
            Disposition::Sell
        }
    }

    pub fn classify(&self, info: &DeadlineInfo) -> Result<Classification> {
        let zeroth_open_epoch = info.zeroth_open_epoch()?;
        let zeroth_deadline = self.clock.timestamp(zeroth_open_epoch)?;
        let hour = self.zone.hour_of(zeroth_deadline);

        Ok(Classification {
            zeroth_open_epoch,
            zeroth_deadline,
            hour,
            disposition: self.classify_hour(hour),
        })
    }
}
