//! Application-wide error types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chain_time::TimeError;
use lotus_gateway::{GatewayError, MessageId};
use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
///
/// One variant per lifecycle stage, so a failed run says exactly which step
/// broke. Nothing is retried automatically.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Admission check failed: {0}")]
    Admission(String),

    #[error("Initializing miner for {worker} failed: {reason}")]
    Init { worker: String, reason: String },

    #[error("Restoring miner for {worker} failed: {reason}")]
    Restore { worker: String, reason: String },

    #[error("Starting miner for {worker} failed: {reason}")]
    Start { worker: String, reason: String },

    #[error("Miner for {worker} not ready after {}s", .timeout.as_secs())]
    StartupTimeout { worker: String, timeout: Duration },

    #[error("Stopping miner for {worker} failed: {reason}")]
    Stop { worker: String, reason: String },

    #[error("Backing up miner for {worker} failed: {reason}")]
    Backup { worker: String, reason: String },

    #[error("Relocating {} to {} failed: {reason}", .from.display(), .to.display())]
    Relocate {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },

    #[error("Chain read failed while {context}: {source}")]
    ChainRead {
        context: String,
        #[source]
        source: GatewayError,
    },

    #[error("Ownership transfer failed: {reason}{}", message_suffix(.message_id))]
    Transfer {
        reason: String,
        message_id: Option<MessageId>,
    },

    #[error("Invalid deadline: {0}")]
    InvalidDeadline(TimeError),

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("IO error while {op} {}: {source}", .path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn message_suffix(message_id: &Option<MessageId>) -> String {
    match message_id {
        Some(id) => format!(" (message {id})"),
        None => String::new(),
    }
}

impl Error {
    pub fn init(worker: impl ToString, reason: impl ToString) -> Self {
        Self::Init {
            worker: worker.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn restore(worker: impl ToString, reason: impl ToString) -> Self {
        Self::Restore {
            worker: worker.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn start(worker: impl ToString, reason: impl ToString) -> Self {
        Self::Start {
            worker: worker.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn stop(worker: impl ToString, reason: impl ToString) -> Self {
        Self::Stop {
            worker: worker.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn backup(worker: impl ToString, reason: impl ToString) -> Self {
        Self::Backup {
            worker: worker.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn relocate(from: &Path, to: &Path, reason: impl ToString) -> Self {
        Self::Relocate {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Adapter for `map_err` on gateway calls.
    pub fn chain_read(context: impl Into<String>) -> impl FnOnce(GatewayError) -> Self {
        let context = context.into();
        move |source| Self::ChainRead { context, source }
    }

    pub fn transfer(reason: impl Into<String>) -> Self {
        Self::Transfer {
            reason: reason.into(),
            message_id: None,
        }
    }

    pub fn transfer_with_message(reason: impl Into<String>, message_id: MessageId) -> Self {
        Self::Transfer {
            reason: reason.into(),
            message_id: Some(message_id),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Short stable name of the variant, recorded in the run ledger.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Admission(_) => "admission",
            Self::Init { .. } => "init",
            Self::Restore { .. } => "restore",
            Self::Start { .. } => "start",
            Self::StartupTimeout { .. } => "startup_timeout",
            Self::Stop { .. } => "stop",
            Self::Backup { .. } => "backup",
            Self::Relocate { .. } => "relocate",
            Self::ChainRead { .. } => "chain_read",
            Self::Transfer { .. } => "transfer",
            Self::InvalidDeadline(_) => "invalid_deadline",
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::Configuration(_) => "configuration",
            Self::Ledger(_) => "ledger",
            Self::IoPath { .. } | Self::Io(_) => "io",
        }
    }
}

impl From<TimeError> for Error {
    fn from(err: TimeError) -> Self {
        if err.is_invalid_deadline() {
            Self::InvalidDeadline(err)
        } else {
            Self::Configuration(err.to_string())
        }
    }
}
