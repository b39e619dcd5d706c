//! Miner lifecycle state machine.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Where a worker's miner daemon is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// No data directory exists for the worker.
    #[default]
    Uninitialized,
    /// A data directory exists; the daemon is not running.
    Initialized,
    /// The daemon is running and answering its API.
    Running,
    /// The daemon was running and has been stopped.
    Stopped,
    /// An archive and the worker key have been written to the backup directory.
    BackedUp,
    /// The data directory has been moved out of the working location.
    Relocated,
    /// A step failed; the run is over.
    Failed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::Initialized => "INITIALIZED",
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
            Self::BackedUp => "BACKED_UP",
            Self::Relocated => "RELOCATED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNINITIALIZED" => Some(Self::Uninitialized),
            "INITIALIZED" => Some(Self::Initialized),
            "RUNNING" => Some(Self::Running),
            "STOPPED" => Some(Self::Stopped),
            "BACKED_UP" => Some(Self::BackedUp),
            "RELOCATED" => Some(Self::Relocated),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether a run in this state is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Relocated | Self::Failed)
    }

    /// State implied by what is on disk, for runs that start mid-way.
    pub fn from_data_dir(exists: bool) -> Self {
        if exists {
            Self::Initialized
        } else {
            Self::Uninitialized
        }
    }

    pub fn can_transition_to(&self, target: LifecycleState) -> bool {
        use LifecycleState::*;

        match (self, target) {
            // Classification happens while running
            (Running, Running) => true,

            (Uninitialized, Initialized) => true,
            (Initialized, Running) => true,
            (Running, Stopped) => true,
            (Stopped, BackedUp) => true,
            (BackedUp, Relocated) => true,
            // Resume relocates without a fresh backup
            (Stopped, Relocated) => true,

            (from, Failed) => !from.is_terminal(),

            _ => false,
        }
    }

    pub fn transition_to(&self, target: LifecycleState) -> Result<LifecycleState, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
