//! Governance configuration
//!
//! Every policy constant the engine uses lives here. Defaults reproduce the
//! reference parameters; deployments override them from a TOML file:
//!
//! ```toml
//! veto_threshold_percent = 15
//! voting_period_secs = 432000
//!
//! [base_quorum]
//! general = 12
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::proposal::ProposalCategory;

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Basis points in 100%
pub const BPS_DENOMINATOR: u64 = 10_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Base quorum percentage per proposal category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BaseQuorums {
    pub general: u8,
    pub minor_parameter: u8,
    pub critical_parameter: u8,
    pub funding: u8,
    pub emergency: u8,
}

impl Default for BaseQuorums {
    fn default() -> Self {
        Self {
            general: 10,
            minor_parameter: 20,
            critical_parameter: 33,
            funding: 15,
            emergency: 40,
        }
    }
}

impl BaseQuorums {
    pub fn get(&self, category: ProposalCategory) -> u8 {
        match category {
            ProposalCategory::General => self.general,
            ProposalCategory::MinorParameter => self.minor_parameter,
            ProposalCategory::CriticalParameter => self.critical_parameter,
            ProposalCategory::Funding => self.funding,
            ProposalCategory::Emergency => self.emergency,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Weight bonus for a vote cast at the very start of the window
    pub max_time_bonus: u64,

    /// Highest accepted reputation score
    pub reputation_max: u64,

    /// Reputation points per percent of multiplier
    pub reputation_divisor: u64,

    /// Cap on the reputation multiplier, in percent
    pub max_reputation_factor: u64,

    /// Veto votes needed to block a critical proposal, percent of stake snapshot
    pub veto_threshold_percent: u64,

    /// Adaptive quorum never drops below this percent of the base
    pub quorum_floor_percent: u64,

    /// Adaptive quorum never rises above this percent of the base
    pub quorum_ceiling_percent: u64,

    /// Participation samples kept per category
    pub history_capacity: usize,

    /// Samples required before the quorum adapts
    pub min_history_for_adaptation: usize,

    /// Mean participation above which the quorum is lowered
    pub high_participation_bps: u64,

    /// Mean participation below which the quorum is raised
    pub low_participation_bps: u64,

    /// Participation distance worth one percent of quorum adjustment
    pub adjustment_step_bps: u64,

    /// Longest delegation chain accepted
    pub max_delegation_depth: usize,

    pub voting_period_secs: u64,
    pub emergency_voting_period_secs: u64,

    /// Gap between submission and the opening of the voting window
    pub voting_delay_secs: u64,

    /// Stakes below this count as small holders in equity metrics
    pub small_stake_limit: u64,

    /// Stakes below this (and not small) count as medium holders
    pub medium_stake_limit: u64,

    pub base_quorum: BaseQuorums,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            max_time_bonus: 5,
            reputation_max: 10_000,
            reputation_divisor: 10,
            max_reputation_factor: 200,
            veto_threshold_percent: 10,
            quorum_floor_percent: 80,
            quorum_ceiling_percent: 120,
            history_capacity: 50,
            min_history_for_adaptation: 5,
            high_participation_bps: 5_000,
            low_participation_bps: 2_000,
            adjustment_step_bps: 100,
            max_delegation_depth: 16,
            voting_period_secs: 7 * SECONDS_PER_DAY,
            emergency_voting_period_secs: SECONDS_PER_DAY,
            voting_delay_secs: 0,
            small_stake_limit: 1_000,
            medium_stake_limit: 100_000,
            base_quorum: BaseQuorums::default(),
        }
    }
}

impl GovernanceConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: GovernanceConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reputation_divisor == 0 {
            return Err(ConfigError::Invalid(
                "reputation_divisor must be positive".to_string(),
            ));
        }
        if self.max_reputation_factor < 100 {
            return Err(ConfigError::Invalid(format!(
                "max_reputation_factor {} is below 100%",
                self.max_reputation_factor
            )));
        }
        if self.veto_threshold_percent > 100 {
            return Err(ConfigError::Invalid(format!(
                "veto_threshold_percent {} exceeds 100",
                self.veto_threshold_percent
            )));
        }
        if self.quorum_floor_percent > 100 || self.quorum_ceiling_percent < 100 {
            return Err(ConfigError::Invalid(format!(
                "quorum bounds {}%..{}% must bracket 100%",
                self.quorum_floor_percent, self.quorum_ceiling_percent
            )));
        }
        if self.history_capacity == 0 || self.min_history_for_adaptation > self.history_capacity {
            return Err(ConfigError::Invalid(format!(
                "history_capacity {} cannot hold {} samples",
                self.history_capacity, self.min_history_for_adaptation
            )));
        }
        if self.low_participation_bps > self.high_participation_bps
            || self.high_participation_bps > BPS_DENOMINATOR
        {
            return Err(ConfigError::Invalid(
                "participation thresholds must satisfy low <= high <= 10000".to_string(),
            ));
        }
        if self.adjustment_step_bps == 0 {
            return Err(ConfigError::Invalid(
                "adjustment_step_bps must be positive".to_string(),
            ));
        }
        if self.max_delegation_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_delegation_depth must be at least 1".to_string(),
            ));
        }
        if self.voting_period_secs == 0 || self.emergency_voting_period_secs == 0 {
            return Err(ConfigError::Invalid(
                "voting periods must be positive".to_string(),
            ));
        }
        if self.small_stake_limit > self.medium_stake_limit {
            return Err(ConfigError::Invalid(
                "small_stake_limit must not exceed medium_stake_limit".to_string(),
            ));
        }
        for category in ProposalCategory::ALL {
            let base = self.base_quorum.get(category);
            if base > 100 {
                return Err(ConfigError::Invalid(format!(
                    "base quorum {} for {:?} exceeds 100",
                    base, category
                )));
            }
            let ceiling = base as u64 * self.quorum_ceiling_percent / 100;
            if ceiling > 100 {
                return Err(ConfigError::Invalid(format!(
                    "adaptive ceiling {} for {:?} exceeds 100",
                    ceiling, category
                )));
            }
        }
        Ok(())
    }

    /// Length of the voting window for a category
    pub fn voting_period(&self, category: ProposalCategory) -> u64 {
        match category {
            ProposalCategory::Emergency => self.emergency_voting_period_secs,
            _ => self.voting_period_secs,
        }
    }
}
