//! Adaptive quorum estimation
//!
//! Each proposal category keeps a bounded window of past participation rates
//! (basis points). Once enough samples exist the category's quorum is
//! lowered when participation has been high and raised when it has been low,
//! always within `[floor%, ceiling%]` of the base quorum.
//!
//! The adapted value is cached and only changes through an explicit
//! `update_adaptive_quorum`, so a proposal's quorum is whatever was cached
//! when it was created.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::config::{BaseQuorums, GovernanceConfig, BPS_DENOMINATOR};
use crate::error::{GovernanceError, Result};
use crate::proposal::ProposalCategory;

/// Adaptive quorum parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuorumParams {
    pub base: BaseQuorums,
    pub floor_percent: u64,
    pub ceiling_percent: u64,
    pub history_capacity: usize,
    pub min_history: usize,
    pub high_participation_bps: u64,
    pub low_participation_bps: u64,
    pub adjustment_step_bps: u64,
}

impl From<&GovernanceConfig> for QuorumParams {
    fn from(config: &GovernanceConfig) -> Self {
        Self {
            base: config.base_quorum.clone(),
            floor_percent: config.quorum_floor_percent,
            ceiling_percent: config.quorum_ceiling_percent,
            history_capacity: config.history_capacity,
            min_history: config.min_history_for_adaptation,
            high_participation_bps: config.high_participation_bps,
            low_participation_bps: config.low_participation_bps,
            adjustment_step_bps: config.adjustment_step_bps.max(1),
        }
    }
}

impl Default for QuorumParams {
    fn default() -> Self {
        Self::from(&GovernanceConfig::default())
    }
}

impl QuorumParams {
    /// Lowest quorum the category may adapt to (rounded up)
    pub fn floor(&self, base: u8) -> u8 {
        let floor = (base as u64 * self.floor_percent).div_ceil(100);
        floor.min(base as u64) as u8
    }

    /// Highest quorum the category may adapt to (rounded down)
    pub fn ceiling(&self, base: u8) -> u8 {
        let ceiling = base as u64 * self.ceiling_percent / 100;
        ceiling.max(base as u64).min(100) as u8
    }
}

/// Participation rate in basis points; zero when nobody was eligible
pub fn participation_rate(votes_cast: u64, eligible_voters: u64) -> Result<u64> {
    if eligible_voters == 0 {
        return Ok(0);
    }
    let rate = votes_cast as u128 * BPS_DENOMINATOR as u128 / eligible_voters as u128;
    if rate > BPS_DENOMINATOR as u128 {
        return Err(GovernanceError::InvalidRate(rate.min(u64::MAX as u128) as u64));
    }
    Ok(rate as u64)
}

/// Quorum for a category given its participation history
pub fn adaptive_quorum(base: u8, rates: &VecDeque<u64>, params: &QuorumParams) -> u8 {
    if rates.is_empty() || rates.len() < params.min_history {
        return base;
    }

    let sum: u128 = rates.iter().map(|r| *r as u128).sum();
    let avg = (sum / rates.len() as u128) as u64;
    let base_wide = base as u64;

    let step = params.adjustment_step_bps.max(1);
    let adjusted = if avg > params.high_participation_bps {
        let steps = (avg - params.high_participation_bps) / step;
        let reduction = base_wide * steps / 100;
        base_wide.saturating_sub(reduction)
    } else if avg < params.low_participation_bps {
        let steps = (params.low_participation_bps - avg) / step;
        let increase = base_wide * steps / 100;
        base_wide.saturating_add(increase)
    } else {
        base_wide
    };

    let ceiling = params.ceiling(base) as u64;
    let floor = (params.floor(base) as u64).min(ceiling);
    adjusted.clamp(floor, ceiling) as u8
}

/// Rolling participation record for one category
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipationHistory {
    pub rates: VecDeque<u64>,
    pub cached_quorum: Option<u8>,
}

/// Shared participation history consulted by new proposals
pub trait ParticipationStore: Send + Sync {
    /// Append a finalized proposal's participation; returns the rate in bps
    fn record_participation(
        &self,
        category: ProposalCategory,
        votes_cast: u64,
        eligible_voters: u64,
    ) -> Result<u64>;

    fn history(&self, category: ProposalCategory) -> Vec<u64>;

    /// Quorum derived from the current history, without caching it
    fn calculate_adaptive_quorum(&self, category: ProposalCategory) -> u8;

    /// Recompute and cache the category's quorum
    fn update_adaptive_quorum(&self, category: ProposalCategory) -> u8;

    /// Cached quorum, or the base quorum if none has been computed
    fn current_quorum(&self, category: ProposalCategory) -> u8;

    /// Every category's history and cached quorum, ordered by category
    fn export_histories(&self) -> Vec<(ProposalCategory, ParticipationHistory)>;

    /// Replace all histories with exported ones
    fn load_histories(&self, histories: Vec<(ProposalCategory, ParticipationHistory)>);
}

/// In-memory participation store
pub struct AdaptiveQuorumEstimator {
    params: QuorumParams,
    histories: RwLock<HashMap<ProposalCategory, ParticipationHistory>>,
}

impl AdaptiveQuorumEstimator {
    pub fn new(params: QuorumParams) -> Self {
        Self {
            params,
            histories: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &GovernanceConfig) -> Self {
        Self::new(QuorumParams::from(config))
    }

    pub fn params(&self) -> &QuorumParams {
        &self.params
    }
}

impl Default for AdaptiveQuorumEstimator {
    fn default() -> Self {
        Self::new(QuorumParams::default())
    }
}

impl ParticipationStore for AdaptiveQuorumEstimator {
    fn record_participation(
        &self,
        category: ProposalCategory,
        votes_cast: u64,
        eligible_voters: u64,
    ) -> Result<u64> {
        let rate = participation_rate(votes_cast, eligible_voters)?;

        let mut histories = self.histories.write();
        let history = histories.entry(category).or_default();
        history.rates.push_back(rate);
        while history.rates.len() > self.params.history_capacity {
            history.rates.pop_front();
        }

        log::debug!(
            "Participation for {}: {} bps ({} samples)",
            category,
            rate,
            history.rates.len()
        );
        Ok(rate)
    }

    fn history(&self, category: ProposalCategory) -> Vec<u64> {
        self.histories
            .read()
            .get(&category)
            .map(|h| h.rates.iter().copied().collect())
            .unwrap_or_default()
    }

    fn calculate_adaptive_quorum(&self, category: ProposalCategory) -> u8 {
        let base = self.params.base.get(category);
        match self.histories.read().get(&category) {
            Some(history) => adaptive_quorum(base, &history.rates, &self.params),
            None => base,
        }
    }

    fn update_adaptive_quorum(&self, category: ProposalCategory) -> u8 {
        let base = self.params.base.get(category);
        let mut histories = self.histories.write();
        let history = histories.entry(category).or_default();
        let quorum = adaptive_quorum(base, &history.rates, &self.params);
        let previous = history.cached_quorum.replace(quorum);

        if previous != Some(quorum) {
            log::info!(
                "Adaptive quorum for {}: {}% (base {}%, {} samples)",
                category,
                quorum,
                base,
                history.rates.len()
            );
        }
        quorum
    }

    fn current_quorum(&self, category: ProposalCategory) -> u8 {
        self.histories
            .read()
            .get(&category)
            .and_then(|h| h.cached_quorum)
            .unwrap_or_else(|| self.params.base.get(category))
    }

    fn export_histories(&self) -> Vec<(ProposalCategory, ParticipationHistory)> {
        let mut histories: Vec<_> = self
            .histories
            .read()
            .iter()
            .map(|(category, history)| (*category, history.clone()))
            .collect();
        histories.sort_by_key(|(category, _)| *category);
        histories
    }

    fn load_histories(&self, histories: Vec<(ProposalCategory, ParticipationHistory)>) {
        let mut loaded = HashMap::new();
        for (category, mut history) in histories {
            while history.rates.len() > self.params.history_capacity {
                history.rates.pop_front();
            }
            let base = self.params.base.get(category);
            let ceiling = self.params.ceiling(base);
            let floor = self.params.floor(base).min(ceiling);
            history.cached_quorum = history.cached_quorum.map(|q| q.clamp(floor, ceiling));
            loaded.insert(category, history);
        }
        *self.histories.write() = loaded;
    }
}
