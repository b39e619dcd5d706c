//! Fee-gated storage-miner creation.
//!
//! A new miner is created only while the network gas premium is below a
//! threshold. Each miner is then classified by the wall-clock hour at which
//! its zeroth proving deadline opens, backed up, and moved out of the
//! working location. Backed-up miners can be resumed for inspection,
//! existing data directories archived, and ownership handed over in bulk.
//!
//! - [`admission`]: the fee gate
//! - [`daemon`]: `lotus-miner` process control
//! - [`lifecycle`]: the state machine and the create/resume/archive protocols
//! - [`ledger`]: disposition lists and the run ledger
//! - [`transfer`]: two-step ownership change

pub mod admission;
pub mod cli;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod transfer;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
