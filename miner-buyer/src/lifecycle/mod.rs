//! Miner lifecycle: the state machine and the protocols that drive it.

pub mod orchestrator;
pub mod state;

pub use orchestrator::{CreateOutcome, LifecycleOrchestrator, RunReport};
pub use state::LifecycleState;
