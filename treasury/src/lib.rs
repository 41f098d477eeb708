//! Governance Treasury Module
//!
//! Custody of the organization's funds. The treasury accepts deposits from
//! members and protocol fees and pays out only when the governance engine
//! asks it to, after a funding proposal has passed every check.

pub mod error;
pub mod pool;

use parking_lot::Mutex;

pub use error::{Result, TreasuryError};
pub use pool::{
    TransactionKind, TreasuryPool, TreasurySource, TreasuryStats, TreasuryTransaction,
    TreasuryWithdrawal,
};

/// Fund custody as seen by the governance core.
///
/// Multi-sig or threshold mechanics live behind this boundary; callers only
/// learn whether the withdrawal went through.
pub trait Treasury: Send + Sync {
    fn withdraw(&self, amount: u64, recipient: &str, timestamp: u64) -> Result<TreasuryWithdrawal>;

    fn balance(&self) -> u64;
}

impl Treasury for Mutex<TreasuryPool> {
    fn withdraw(&self, amount: u64, recipient: &str, timestamp: u64) -> Result<TreasuryWithdrawal> {
        self.lock().withdraw(amount, recipient, timestamp)
    }

    fn balance(&self) -> u64 {
        self.lock().balance()
    }
}
