//! Treasury Pool Management
//!
//! The pool is the custody side of governance: it receives contributions and
//! protocol fees and releases funds only through `withdraw`, which the
//! governance engine calls after a funding proposal passes. Every balance
//! change is appended to an audit trail.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TreasuryError};

/// Where deposited funds came from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TreasurySource {
    /// Voluntary contribution from a member
    Contribution(String),
    /// Share of protocol fees routed to the treasury
    ProtocolFees,
}

/// Kind of balance change recorded in the audit trail
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransactionKind {
    Deposit(TreasurySource),
    Withdrawal { recipient: String },
}

/// A single audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreasuryTransaction {
    pub id: u64,
    pub kind: TransactionKind,
    pub amount: u64,
    pub timestamp: u64,
    pub balance_after: u64,
}

/// Receipt returned for a completed withdrawal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreasuryWithdrawal {
    pub transaction_id: u64,
    pub recipient: String,
    pub amount: u64,
    pub timestamp: u64,
}

/// Aggregate treasury statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreasuryStats {
    pub balance: u64,
    pub total_deposited: u64,
    pub total_withdrawn: u64,
    pub deposit_count: u64,
    pub withdrawal_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreasuryPool {
    balance: u64,
    total_deposited: u64,
    total_withdrawn: u64,
    transactions: Vec<TreasuryTransaction>,
}

impl TreasuryPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    /// Full audit trail, oldest first
    pub fn transactions(&self) -> &[TreasuryTransaction] {
        &self.transactions
    }

    /// Deposit funds from the given source
    pub fn deposit(&mut self, source: TreasurySource, amount: u64, timestamp: u64) -> Result<u64> {
        if amount == 0 {
            return Err(TreasuryError::InvalidAmount(
                "Deposit amount must be positive".to_string(),
            ));
        }

        let new_balance = self
            .balance
            .checked_add(amount)
            .ok_or(TreasuryError::Overflow)?;
        let new_total = self
            .total_deposited
            .checked_add(amount)
            .ok_or(TreasuryError::Overflow)?;

        self.balance = new_balance;
        self.total_deposited = new_total;
        let id = self.record(TransactionKind::Deposit(source), amount, timestamp);

        log::debug!("Treasury deposit #{}: {} (balance {})", id, amount, self.balance);
        Ok(id)
    }

    /// Contribution from a named member
    pub fn deposit_contribution(&mut self, from: &str, amount: u64, timestamp: u64) -> Result<u64> {
        self.deposit(TreasurySource::Contribution(from.to_string()), amount, timestamp)
    }

    /// Release funds to a recipient
    pub fn withdraw(
        &mut self,
        amount: u64,
        recipient: &str,
        timestamp: u64,
    ) -> Result<TreasuryWithdrawal> {
        if amount == 0 {
            return Err(TreasuryError::InvalidAmount(
                "Withdrawal amount must be positive".to_string(),
            ));
        }
        if recipient.trim().is_empty() {
            return Err(TreasuryError::InvalidRecipient(
                "Recipient must not be empty".to_string(),
            ));
        }
        if amount > self.balance {
            return Err(TreasuryError::InsufficientBalance {
                requested: amount,
                available: self.balance,
            });
        }

        self.balance -= amount;
        self.total_withdrawn = self.total_withdrawn.saturating_add(amount);
        let transaction_id = self.record(
            TransactionKind::Withdrawal {
                recipient: recipient.to_string(),
            },
            amount,
            timestamp,
        );

        log::info!(
            "Treasury withdrawal #{}: {} to {} (balance {})",
            transaction_id,
            amount,
            recipient,
            self.balance
        );

        Ok(TreasuryWithdrawal {
            transaction_id,
            recipient: recipient.to_string(),
            amount,
            timestamp,
        })
    }

    pub fn stats(&self) -> TreasuryStats {
        let withdrawal_count = self
            .transactions
            .iter()
            .filter(|tx| matches!(tx.kind, TransactionKind::Withdrawal { .. }))
            .count() as u64;

        TreasuryStats {
            balance: self.balance,
            total_deposited: self.total_deposited,
            total_withdrawn: self.total_withdrawn,
            deposit_count: self.transactions.len() as u64 - withdrawal_count,
            withdrawal_count,
        }
    }

    /// Serialize the pool (balance and audit trail) as JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| TreasuryError::SerializationError(e.to_string()))
    }

    fn record(&mut self, kind: TransactionKind, amount: u64, timestamp: u64) -> u64 {
        let id = self.transactions.len() as u64 + 1;
        self.transactions.push(TreasuryTransaction {
            id,
            kind,
            amount,
            timestamp,
            balance_after: self.balance,
        });
        id
    }
}
