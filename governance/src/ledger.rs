//! Stake and reputation ledger
//!
//! The governance core only reads from the ledger. `InMemoryStakeLedger` is
//! a concurrent map used for wiring and tests; a chain runtime supplies its
//! own implementation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{GovernanceError, Result};

pub const MAX_REPUTATION: u64 = 10_000;

pub trait StakeLedger: Send + Sync {
    fn get_stake(&self, voter: &str) -> u64;

    /// Reputation score in `[0, 10000]`
    fn get_reputation(&self, voter: &str) -> u64;

    fn get_total_stake(&self) -> u64;

    /// Number of holders eligible to vote
    fn eligible_voters(&self) -> u64;
}

#[derive(Default)]
pub struct InMemoryStakeLedger {
    stakes: DashMap<String, u64>,
    reputations: DashMap<String, u64>,
    total_stake: AtomicU64,
}

impl InMemoryStakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a holder's stake, keeping the running total in step
    pub fn set_stake(&self, voter: &str, stake: u64) -> Result<()> {
        match self.stakes.entry(voter.to_string()) {
            Entry::Occupied(mut entry) => {
                self.adjust_total(*entry.get(), stake)?;
                if stake == 0 {
                    entry.remove();
                } else {
                    *entry.get_mut() = stake;
                }
            }
            Entry::Vacant(entry) => {
                self.adjust_total(0, stake)?;
                if stake > 0 {
                    entry.insert(stake);
                }
            }
        }
        Ok(())
    }

    pub fn set_reputation(&self, voter: &str, reputation: u64) -> Result<()> {
        if reputation > MAX_REPUTATION {
            return Err(GovernanceError::InvalidInput(format!(
                "reputation {} exceeds maximum {}",
                reputation, MAX_REPUTATION
            )));
        }
        self.reputations.insert(voter.to_string(), reputation);
        Ok(())
    }

    fn adjust_total(&self, previous: u64, stake: u64) -> Result<()> {
        self.total_stake
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |total| {
                total.saturating_sub(previous).checked_add(stake)
            })
            .map(|_| ())
            .map_err(|_| GovernanceError::ArithmeticOverflow("total stake"))
    }
}

impl StakeLedger for InMemoryStakeLedger {
    fn get_stake(&self, voter: &str) -> u64 {
        self.stakes.get(voter).map(|s| *s).unwrap_or(0)
    }

    fn get_reputation(&self, voter: &str) -> u64 {
        self.reputations.get(voter).map(|r| *r).unwrap_or(0)
    }

    fn get_total_stake(&self) -> u64 {
        self.total_stake.load(Ordering::SeqCst)
    }

    fn eligible_voters(&self) -> u64 {
        self.stakes.len() as u64
    }
}
