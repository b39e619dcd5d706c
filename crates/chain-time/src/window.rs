//! Daily wall-clock windows.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TimeError};

/// Accepted time-of-day layouts, tried in order.
const TIME_FORMATS: [&str; 4] = ["%I:%M%p", "%I:%M %p", "%H:%M", "%H:%M:%S"];

/// Inclusive window of wall-clock hours.
///
/// The window never wraps past midnight: `22..=3` contains no hour at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl TimeWindow {
    pub fn new(start_hour: u32, end_hour: u32) -> Result<Self> {
        for hour in [start_hour, end_hour] {
            if hour > 23 {
                return Err(TimeError::InvalidTimeOfDay(format!("hour {hour} out of range")));
            }
        }
        Ok(Self {
            start_hour,
            end_hour,
        })
    }

    /// Build a window from two time-of-day strings (`9:00AM`, `17:00`, ...).
    pub fn parse(start: &str, finish: &str) -> Result<Self> {
        Self::new(parse_hour(start)?, parse_hour(finish)?)
    }

    /// Whether `hour` falls within the window, bounds included.
    pub fn contains(&self, hour: u32) -> bool {
        self.start_hour <= hour && hour <= self.end_hour
    }

    /// A reversed window, which contains no hour.
    pub fn is_empty(&self) -> bool {
        self.start_hour > self.end_hour
    }
}

impl Default for TimeWindow {
    /// 09:00 to 17:00.
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 17,
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:00-{:02}:00", self.start_hour, self.end_hour)
    }
}

impl FromStr for TimeWindow {
    type Err = TimeError;

    /// Parses `START-FINISH`, e.g. `9:00AM-5:00PM` or `09:00-17:00`.
    fn from_str(s: &str) -> Result<Self> {
        let (start, finish) = s
            .split_once('-')
            .ok_or_else(|| TimeError::InvalidTimeOfDay(s.to_string()))?;
        Self::parse(start.trim(), finish.trim())
    }
}

/// Extract the hour from a time-of-day string.
pub fn parse_hour(value: &str) -> Result<u32> {
    let trimmed = value.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(trimmed, fmt).ok())
        .map(|t| t.hour())
        .ok_or_else(|| TimeError::InvalidTimeOfDay(value.to_string()))
}
