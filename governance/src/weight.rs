//! Vote weight calculation
//!
//! A ballot's weight combines three factors:
//! - quadratic dampening: `floor(sqrt(stake))`
//! - an early-voting bonus that decays linearly to zero across the window
//! - a reputation multiplier between 100% and `max_reputation_factor`
//!
//! `final = floor((sqrt(stake) + time_bonus) * reputation_factor / 100)`
//!
//! The computation is integer-only and must give identical results on every
//! node, so nothing here touches floating point.

use serde::{Deserialize, Serialize};

use crate::config::GovernanceConfig;
use crate::error::{GovernanceError, Result};

/// Parameters of the weight formula
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeightParams {
    pub max_time_bonus: u64,
    pub reputation_max: u64,
    pub reputation_divisor: u64,
    pub max_reputation_factor: u64,
}

impl Default for WeightParams {
    fn default() -> Self {
        Self::from(&GovernanceConfig::default())
    }
}

impl From<&GovernanceConfig> for WeightParams {
    fn from(config: &GovernanceConfig) -> Self {
        Self {
            max_time_bonus: config.max_time_bonus,
            reputation_max: config.reputation_max,
            reputation_divisor: config.reputation_divisor,
            max_reputation_factor: config.max_reputation_factor,
        }
    }
}

/// Exact `floor(sqrt(n))` by Newton iteration
pub fn integer_sqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }

    // Start from a power of two at or above the root so iterates only decrease
    let shift = (128 - n.leading_zeros()).div_ceil(2);
    let mut x: u128 = 1 << shift;
    loop {
        let y = (x + n / x) / 2;
        if y >= x {
            return x;
        }
        x = y;
    }
}

/// Early-voting bonus: `max_bonus` at the opening, zero once the window is over
pub fn time_bonus(elapsed: u64, window: u64, max_bonus: u64) -> u64 {
    if window == 0 || elapsed >= window {
        return 0;
    }
    let decay = (elapsed as u128 * max_bonus as u128) / window as u128;
    // decay <= max_bonus because elapsed < window
    max_bonus.saturating_sub(decay as u64)
}

/// Reputation multiplier in percent
pub fn reputation_factor(reputation: u64, params: &WeightParams) -> u64 {
    let factor = 100u64.saturating_add(reputation / params.reputation_divisor.max(1));
    factor.min(params.max_reputation_factor)
}

/// Weight with the default parameters
pub fn compute_weight(stake: u64, reputation: u64, elapsed: u64, window: u64) -> Result<u64> {
    compute_weight_with(&WeightParams::default(), stake, reputation, elapsed, window)
}

/// Weight of a single ballot.
///
/// `elapsed` and `window` are in seconds. Fails with `InvalidInput` for a
/// zero stake or a reputation above `reputation_max`.
pub fn compute_weight_with(
    params: &WeightParams,
    stake: u64,
    reputation: u64,
    elapsed: u64,
    window: u64,
) -> Result<u64> {
    if stake == 0 {
        return Err(GovernanceError::InvalidInput(
            "stake must be positive".to_string(),
        ));
    }
    if reputation > params.reputation_max {
        return Err(GovernanceError::InvalidInput(format!(
            "reputation {} exceeds maximum {}",
            reputation, params.reputation_max
        )));
    }

    let base = integer_sqrt(stake as u128);
    let bonus = time_bonus(elapsed, window, params.max_time_bonus) as u128;
    let factor = reputation_factor(reputation, params) as u128;

    let weighted = base
        .checked_add(bonus)
        .and_then(|v| v.checked_mul(factor))
        .ok_or(GovernanceError::ArithmeticOverflow("vote weight"))?
        / 100;

    u64::try_from(weighted).map_err(|_| GovernanceError::ArithmeticOverflow("vote weight"))
}
