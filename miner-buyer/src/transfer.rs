//! Miner ownership transfer.
//!
//! Changing a miner's owner is two `ChangeOwnerAddress` messages: the current
//! owner proposes the new owner, then the new owner confirms by sending the
//! same message naming itself.

use std::sync::Arc;

use lotus_gateway::{Address, ChainGateway, Message, MessageId};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::ledger::RunLedger;

/// Both halves of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    pub miner: Address,
    pub new_owner: Address,
    pub proposal: MessageId,
    pub confirmation: MessageId,
}

/// One line of a bulk transfer file: `<worker-or-miner> [<new-owner>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkEntry {
    pub target: Address,
    pub new_owner: Option<Address>,
}

/// Parse a bulk transfer file. Blank lines and `#` comments are skipped.
pub fn parse_bulk_file(contents: &str) -> Result<Vec<BulkEntry>> {
    let mut entries = Vec::new();

    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parse = |field: &str| {
            field
                .parse::<Address>()
                .map_err(|e| Error::config(format!("line {}: {e}", index + 1)))
        };

        let fields: Vec<&str> = line.split_whitespace().collect();
        let entry = match fields.as_slice() {
            [target] => BulkEntry {
                target: parse(*target)?,
                new_owner: None,
            },
            [target, new_owner] => BulkEntry {
                target: parse(*target)?,
                new_owner: Some(parse(*new_owner)?),
            },
            _ => {
                return Err(Error::config(format!(
                    "line {}: expected `<miner-or-worker> [<new-owner>]`, got {} fields",
                    index + 1,
                    fields.len()
                )));
            }
        };
        entries.push(entry);
    }

    Ok(entries)
}

/// Sends and verifies ownership changes.
pub struct OwnershipTransfer {
    gateway: Arc<dyn ChainGateway>,
    confidence: u64,
}

impl OwnershipTransfer {
    pub fn new(gateway: Arc<dyn ChainGateway>, confidence: u64) -> Self {
        Self {
            gateway,
            confidence,
        }
    }

    async fn resolve(&self, addr: &Address) -> Result<Address> {
        self.gateway
            .resolve_address(addr)
            .await
            .map_err(Error::chain_read(format!("resolving {addr}")))
    }

    /// Send one `ChangeOwnerAddress` from `from`, naming `to`, and wait for it.
    ///
    /// `from` must be the current owner (proposal) or `to` itself
    /// (confirmation); anything else is refused before a message is sent.
    pub async fn change_owner(
        &self,
        miner: &Address,
        from: &Address,
        to: &Address,
    ) -> Result<MessageId> {
        let miner_id = self.resolve(miner).await?;
        let from_id = self.resolve(from).await?;
        let to_id = self.resolve(to).await?;
        self.change_owner_resolved(&miner_id, &from_id, &to_id)
            .await
    }

    async fn change_owner_resolved(
        &self,
        miner: &Address,
        from: &Address,
        to: &Address,
    ) -> Result<MessageId> {
        let miner_info = self
            .gateway
            .miner_info(miner)
            .await
            .map_err(Error::chain_read(format!("reading miner info of {miner}")))?;
        if from != &miner_info.owner && from != to {
            return Err(Error::transfer(format!(
                "{from} is neither the current owner ({}) nor the proposed owner ({to}) of {miner}",
                miner_info.owner
            )));
        }

        let message = Message::change_owner(from.clone(), miner.clone(), to)
            .map_err(|e| Error::transfer(e.to_string()))?;
        let id = self
            .gateway
            .submit_message(message)
            .await
            .map_err(Error::chain_read("submitting owner change"))?;
        info!(%miner, %from, %to, cid = %id, "Owner change submitted");

        let lookup = self
            .gateway
            .wait_for_message(&id, self.confidence)
            .await
            .map_err(Error::chain_read("waiting for owner change"))?;
        if !lookup.receipt.is_success() {
            return Err(Error::transfer_with_message(
                format!("message exited with code {}", lookup.receipt.exit_code),
                id,
            ));
        }
        Ok(id)
    }

    /// Propose and confirm a new owner for `miner`, checking chain state after each step.
    pub async fn transfer(
        &self,
        miner: &Address,
        from: &Address,
        to: &Address,
    ) -> Result<TransferReport> {
        let miner_id = self.resolve(miner).await?;
        let from_id = self.resolve(from).await?;
        let to_id = self.resolve(to).await?;
        if from_id == to_id {
            return Err(Error::transfer(format!(
                "{from} and {to} are the same account"
            )));
        }

        let proposal = self
            .change_owner_resolved(&miner_id, &from_id, &to_id)
            .await?;
        let pending = self
            .gateway
            .miner_info(&miner_id)
            .await
            .map_err(Error::chain_read(format!("reading miner info of {miner_id}")))?
            .pending_owner_address;
        if pending.as_ref() != Some(&to_id) {
            return Err(Error::transfer_with_message(
                format!(
                    "pending owner of {miner_id} is {} after proposal, expected {to_id}",
                    pending.map_or_else(|| "unset".to_string(), |a| a.to_string())
                ),
                proposal,
            ));
        }

        let confirmation = self
            .change_owner_resolved(&miner_id, &to_id, &to_id)
            .await?;
        let owner = self
            .gateway
            .miner_info(&miner_id)
            .await
            .map_err(Error::chain_read(format!("reading miner info of {miner_id}")))?
            .owner;
        if owner != to_id {
            return Err(Error::transfer_with_message(
                format!("owner of {miner_id} is {owner} after confirmation, expected {to_id}"),
                confirmation,
            ));
        }

        info!(miner = %miner_id, owner = %to_id, "Ownership transferred");
        Ok(TransferReport {
            miner: miner_id,
            new_owner: to_id,
            proposal,
            confirmation,
        })
    }

    /// Miner actor for a bulk target: the miner recorded for a worker, else
    /// the target itself when it is an ID address.
    pub async fn resolve_target(&self, target: &Address, runs: &RunLedger) -> Result<Address> {
        if let Some(miner) = runs.miner_for_worker(target).await? {
            return Ok(miner);
        }
        if target.id().is_some() {
            return Ok(target.clone());
        }
        Err(Error::config(format!(
            "no miner recorded for worker {target} in {}",
            runs.path().display()
        )))
    }

    /// Transfer every entry in order, stopping at the first failure.
    ///
    /// All targets and new owners are resolved before anything is sent.
    pub async fn bulk_transfer(
        &self,
        entries: &[BulkEntry],
        from: &Address,
        default_new_owner: Option<&Address>,
        runs: &RunLedger,
    ) -> Result<Vec<TransferReport>> {
        let mut plan = Vec::with_capacity(entries.len());
        for entry in entries {
            let miner = self.resolve_target(&entry.target, runs).await?;
            let new_owner = entry
                .new_owner
                .as_ref()
                .or(default_new_owner)
                .ok_or_else(|| {
                    Error::config(format!("no new owner given for {}", entry.target))
                })?;
            plan.push((miner, new_owner.clone()));
        }
        info!(count = plan.len(), %from, "Starting bulk transfer");

        let mut reports = Vec::with_capacity(plan.len());
        for (index, (miner, new_owner)) in plan.iter().enumerate() {
            match self.transfer(miner, from, new_owner).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!(
                        %miner,
                        done = index,
                        remaining = plan.len() - index,
                        "Bulk transfer stopped: {}",
                        e
                    );
                    return Err(e);
                }
            }
        }
        Ok(reports)
    }
}
