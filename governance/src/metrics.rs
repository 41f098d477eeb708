//! Equity metrics
//!
//! Tracks how voting weight is spread across small, medium and large
//! holders, plus participation across finalized proposals. The
//! concentration score is a Gini coefficient over the bracket totals.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::{GovernanceConfig, BPS_DENOMINATOR};
use crate::error::{GovernanceError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StakeBracket {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StakeBrackets {
    pub small_limit: u64,
    pub medium_limit: u64,
}

impl StakeBrackets {
    pub fn classify(&self, stake: u64) -> StakeBracket {
        if stake < self.small_limit {
            StakeBracket::Small
        } else if stake < self.medium_limit {
            StakeBracket::Medium
        } else {
            StakeBracket::Large
        }
    }
}

impl From<&GovernanceConfig> for StakeBrackets {
    fn from(config: &GovernanceConfig) -> Self {
        Self {
            small_limit: config.small_stake_limit,
            medium_limit: config.medium_stake_limit,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EquityMetrics {
    pub total_weighted_votes: u64,
    pub unique_voters: u64,
    pub small_bracket_votes: u64,
    pub medium_bracket_votes: u64,
    pub large_bracket_votes: u64,
    /// Gini coefficient of the bracket totals, in basis points
    pub concentration_bps: u64,
    pub proposals_finalized: u64,
    pub participation_bps_sum: u64,
}

impl EquityMetrics {
    pub fn average_participation_bps(&self) -> u64 {
        if self.proposals_finalized == 0 {
            return 0;
        }
        self.participation_bps_sum / self.proposals_finalized
    }

    fn bracket_totals(&self) -> [u64; 3] {
        [
            self.small_bracket_votes,
            self.medium_bracket_votes,
            self.large_bracket_votes,
        ]
    }
}

/// Gini coefficient in basis points: `sum |xi - xj| / (2 * n * sum x)`
pub fn gini_bps(values: &[u64]) -> u64 {
    let total: u128 = values.iter().map(|v| *v as u128).sum();
    if values.is_empty() || total == 0 {
        return 0;
    }

    let mut diff_sum: u128 = 0;
    for a in values {
        for b in values {
            diff_sum += (*a as i128 - *b as i128).unsigned_abs();
        }
    }

    let n = values.len() as u128;
    (diff_sum * BPS_DENOMINATOR as u128 / (2 * n * total)) as u64
}

pub trait MetricsStore: Send + Sync {
    fn record_vote(&self, voter: &str, stake: u64, weight: u64) -> Result<()>;

    fn record_finalization(&self, participation_bps: u64);

    fn snapshot(&self) -> EquityMetrics;

    /// Full state, including the voter set behind `unique_voters`
    fn export_state(&self) -> MetricsState;

    /// Replace the current state with an exported one
    fn load_state(&self, state: MetricsState);
}

/// Persistable metrics state
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricsState {
    pub metrics: EquityMetrics,
    pub voters: BTreeSet<String>,
}

/// In-memory metrics aggregator
pub struct InMemoryMetrics {
    brackets: StakeBrackets,
    state: Mutex<MetricsState>,
}

impl InMemoryMetrics {
    pub fn new(brackets: StakeBrackets) -> Self {
        Self {
            brackets,
            state: Mutex::new(MetricsState::default()),
        }
    }

    pub fn from_config(config: &GovernanceConfig) -> Self {
        Self::new(StakeBrackets::from(config))
    }
}

impl Default for InMemoryMetrics {
    fn default() -> Self {
        Self::from_config(&GovernanceConfig::default())
    }
}

impl MetricsStore for InMemoryMetrics {
    fn record_vote(&self, voter: &str, stake: u64, weight: u64) -> Result<()> {
        let mut state = self.state.lock();
        let metrics = &mut state.metrics;

        let total = metrics
            .total_weighted_votes
            .checked_add(weight)
            .ok_or(GovernanceError::ArithmeticOverflow("weighted vote total"))?;
        let bracket = match self.brackets.classify(stake) {
            StakeBracket::Small => &mut metrics.small_bracket_votes,
            StakeBracket::Medium => &mut metrics.medium_bracket_votes,
            StakeBracket::Large => &mut metrics.large_bracket_votes,
        };
        *bracket = bracket
            .checked_add(weight)
            .ok_or(GovernanceError::ArithmeticOverflow("bracket vote total"))?;
        metrics.total_weighted_votes = total;
        metrics.concentration_bps = gini_bps(&metrics.bracket_totals());

        if state.voters.insert(voter.to_string()) {
            state.metrics.unique_voters += 1;
        }
        Ok(())
    }

    fn record_finalization(&self, participation_bps: u64) {
        let mut state = self.state.lock();
        state.metrics.proposals_finalized += 1;
        state.metrics.participation_bps_sum = state
            .metrics
            .participation_bps_sum
            .saturating_add(participation_bps);
    }

    fn snapshot(&self) -> EquityMetrics {
        self.state.lock().metrics.clone()
    }

    fn export_state(&self) -> MetricsState {
        self.state.lock().clone()
    }

    fn load_state(&self, mut state: MetricsState) {
        // Derived fields follow the counters they summarize
        state.metrics.unique_voters = state.voters.len() as u64;
        state.metrics.concentration_bps = gini_bps(&state.metrics.bracket_totals());
        *self.state.lock() = state;
    }
}
