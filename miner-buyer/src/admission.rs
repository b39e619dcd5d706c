//! Fee-based admission gate.

use std::sync::Arc;

use lotus_gateway::{Address, ChainGateway, TokenAmount};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Blocks ahead the premium estimate targets.
pub const FEE_LOOKAHEAD_BLOCKS: u64 = 2;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionDecision {
    /// `None` when the estimate could not be read.
    pub estimate: Option<TokenAmount>,
    pub threshold: TokenAmount,
    pub admitted: bool,
}

/// Admits a new miner only while the gas premium is below a threshold.
///
/// Fails closed: any error reading the estimate means "do not admit".
pub struct AdmissionGate {
    gateway: Arc<dyn ChainGateway>,
    threshold: TokenAmount,
}

impl AdmissionGate {
    pub fn new(gateway: Arc<dyn ChainGateway>, threshold: TokenAmount) -> Self {
        Self { gateway, threshold }
    }

    pub fn threshold(&self) -> TokenAmount {
        self.threshold
    }

    /// Current premium estimate, with the system actor as reference sender.
    pub async fn estimate(&self) -> Result<TokenAmount> {
        self.gateway
            .estimate_fee_rate(FEE_LOOKAHEAD_BLOCKS, &Address::system_actor())
            .await
            .map_err(|e| Error::Admission(e.to_string()))
    }

    pub async fn evaluate(&self) -> AdmissionDecision {
        match self.estimate().await {
            Ok(estimate) => {
                let admitted = estimate < self.threshold;
                info!(
                    blocks = FEE_LOOKAHEAD_BLOCKS,
                    estimate = %estimate,
                    estimate_atto = estimate.atto(),
                    threshold = %self.threshold,
                    admitted,
                    "Fee estimate"
                );
                AdmissionDecision {
                    estimate: Some(estimate),
                    threshold: self.threshold,
                    admitted,
                }
            }
            Err(e) => {
                warn!("Fee estimate unavailable, not admitting: {}", e);
                AdmissionDecision {
                    estimate: None,
                    threshold: self.threshold,
                    admitted: false,
                }
            }
        }
    }

    pub async fn should_admit(&self) -> bool {
        self.evaluate().await.admitted
    }
}
