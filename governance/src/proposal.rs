//! Proposal types and lifecycle rules
//!
//! A proposal moves `Pending -> Active -> {Succeeded, Defeated, QuorumFailed,
//! Vetoed}` and from `Succeeded` to `Executed`. Pending and Active are derived
//! from the clock; terminal states are stored once evaluated.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{GovernanceError, Result};

pub type ProposalId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProposalCategory {
    General,
    MinorParameter,
    CriticalParameter,
    Funding,
    Emergency,
}

impl ProposalCategory {
    pub const ALL: [ProposalCategory; 5] = [
        ProposalCategory::General,
        ProposalCategory::MinorParameter,
        ProposalCategory::CriticalParameter,
        ProposalCategory::Funding,
        ProposalCategory::Emergency,
    ];

    pub fn allows_veto(&self) -> bool {
        matches!(self, ProposalCategory::CriticalParameter)
    }

    pub fn is_parameter_change(&self) -> bool {
        matches!(
            self,
            ProposalCategory::MinorParameter | ProposalCategory::CriticalParameter
        )
    }
}

impl fmt::Display for ProposalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::General => write!(f, "General"),
            Self::MinorParameter => write!(f, "Minor Parameter"),
            Self::CriticalParameter => write!(f, "Critical Parameter"),
            Self::Funding => write!(f, "Funding"),
            Self::Emergency => write!(f, "Emergency"),
        }
    }
}

/// Category-specific action carried out on execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProposalPayload {
    None,
    Funding {
        amount: u64,
        recipient: String,
    },
    ParameterChange {
        target: String,
        name: String,
        value: u64,
    },
}

impl ProposalPayload {
    /// Check the payload carries exactly what the category needs
    pub fn validate_for(&self, category: ProposalCategory) -> Result<()> {
        match (category, self) {
            (ProposalCategory::Funding, ProposalPayload::Funding { amount, recipient }) => {
                if *amount == 0 {
                    return Err(GovernanceError::MissingPayload(
                        "funding amount must be positive".to_string(),
                    ));
                }
                if recipient.trim().is_empty() {
                    return Err(GovernanceError::MissingPayload(
                        "funding recipient is required".to_string(),
                    ));
                }
                Ok(())
            }
            (ProposalCategory::Funding, _) => Err(GovernanceError::MissingPayload(
                "funding proposals require an amount and recipient".to_string(),
            )),
            (c, ProposalPayload::ParameterChange { target, name, .. })
                if c.is_parameter_change() || c == ProposalCategory::Emergency =>
            {
                if target.trim().is_empty() || name.trim().is_empty() {
                    return Err(GovernanceError::MissingPayload(
                        "parameter target and name are required".to_string(),
                    ));
                }
                Ok(())
            }
            (c, _) if c.is_parameter_change() => Err(GovernanceError::MissingPayload(
                "parameter proposals require a target, name and value".to_string(),
            )),
            (_, ProposalPayload::None) => Ok(()),
            (c, _) => Err(GovernanceError::InvalidInput(format!(
                "{} proposals do not carry an executable payload",
                c
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProposalStatus {
    /// Submitted, voting window not yet open
    Pending,
    /// Accepting votes
    Active,
    Succeeded,
    Defeated,
    QuorumFailed,
    Vetoed,
    /// Succeeded and its payload has been dispatched
    Executed,
}

impl ProposalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProposalStatus::Pending | ProposalStatus::Active)
    }
}

/// One voter's recorded ballot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ballot {
    pub voter: String,
    pub stake: u64,
    pub weight: u64,
    pub support: bool,
    pub is_veto: bool,
    pub cast_at: u64,
    /// Addresses whose stake backs this ballot and was not already counted
    pub represented: Vec<String>,
}

/// Parameters for creating a new proposal
#[derive(Debug, Clone)]
pub struct ProposalParams {
    pub id: ProposalId,
    pub creator: String,
    pub description: String,
    pub category: ProposalCategory,
    pub payload: ProposalPayload,
    pub quorum_percentage: u8,
    pub veto_threshold_percent: u64,
    pub total_stake_snapshot: u64,
    pub start_time: u64,
    pub voting_duration: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub creator: String,
    pub description: String,
    pub category: ProposalCategory,
    pub payload: ProposalPayload,
    pub votes_for: u64,
    pub votes_against: u64,
    pub veto_votes: u64,
    pub quorum_percentage: u8,
    pub veto_threshold_percent: u64,
    pub total_stake_snapshot: u64,
    pub start_time: u64,
    pub end_time: u64,
    pub voting_duration: u64,
    pub executed: bool,
    /// Stored once the proposal has been evaluated after `end_time`
    pub outcome: Option<ProposalStatus>,
    pub ballots: BTreeMap<String, Ballot>,
    /// Every address whose stake has been counted on this proposal.
    /// A voter voting only with delegated stake is not in here.
    pub represented: BTreeSet<String>,
}

impl Proposal {
    pub fn new(params: ProposalParams) -> Result<Self> {
        params.payload.validate_for(params.category)?;
        if params.quorum_percentage > 100 {
            return Err(GovernanceError::InvalidInput(format!(
                "quorum {}% exceeds 100%",
                params.quorum_percentage
            )));
        }
        let end_time = params
            .start_time
            .checked_add(params.voting_duration)
            .ok_or(GovernanceError::ArithmeticOverflow("proposal end time"))?;

        Ok(Self {
            id: params.id,
            creator: params.creator,
            description: params.description,
            category: params.category,
            payload: params.payload,
            votes_for: 0,
            votes_against: 0,
            veto_votes: 0,
            quorum_percentage: params.quorum_percentage,
            veto_threshold_percent: params.veto_threshold_percent,
            total_stake_snapshot: params.total_stake_snapshot,
            start_time: params.start_time,
            end_time,
            voting_duration: params.voting_duration,
            executed: false,
            outcome: None,
            ballots: BTreeMap::new(),
            represented: BTreeSet::new(),
        })
    }

    pub fn is_active(&self, now: u64) -> bool {
        now >= self.start_time && now < self.end_time
    }

    pub fn has_ended(&self, now: u64) -> bool {
        now >= self.end_time
    }

    /// Lifecycle state at `now`
    pub fn status(&self, now: u64) -> ProposalStatus {
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        if now < self.start_time {
            ProposalStatus::Pending
        } else if now < self.end_time {
            ProposalStatus::Active
        } else {
            self.evaluate()
        }
    }

    /// Weighted votes required for the outcome to be binding
    pub fn quorum_value(&self) -> u64 {
        // stake * percentage / 100 never exceeds stake
        (self.total_stake_snapshot as u128 * self.quorum_percentage as u128 / 100) as u64
    }

    pub fn veto_threshold(&self) -> u64 {
        (self.total_stake_snapshot as u128 * self.veto_threshold_percent as u128 / 100) as u64
    }

    /// Weighted votes counted toward quorum
    pub fn votes_cast(&self) -> u128 {
        self.votes_for as u128 + self.votes_against as u128
    }

    /// Terminal evaluation of the tallies: quorum first, then majority, then veto
    pub fn evaluate(&self) -> ProposalStatus {
        if self.votes_cast() < self.quorum_value() as u128 {
            ProposalStatus::QuorumFailed
        } else if self.votes_for <= self.votes_against {
            ProposalStatus::Defeated
        } else if self.category.allows_veto() && self.veto_votes >= self.veto_threshold() {
            ProposalStatus::Vetoed
        } else {
            ProposalStatus::Succeeded
        }
    }

    /// Typed error for a non-passing outcome
    pub fn outcome_error(&self, status: ProposalStatus) -> Option<GovernanceError> {
        match status {
            ProposalStatus::QuorumFailed => Some(GovernanceError::QuorumNotMet {
                cast: self.votes_cast().min(u64::MAX as u128) as u64,
                required: self.quorum_value(),
            }),
            ProposalStatus::Defeated => Some(GovernanceError::Rejected {
                votes_for: self.votes_for,
                votes_against: self.votes_against,
            }),
            ProposalStatus::Vetoed => Some(GovernanceError::Vetoed {
                veto_votes: self.veto_votes,
                threshold: self.veto_threshold(),
            }),
            ProposalStatus::Executed => Some(GovernanceError::AlreadyExecuted),
            ProposalStatus::Pending | ProposalStatus::Active => Some(GovernanceError::NotEnded),
            ProposalStatus::Succeeded => None,
        }
    }

    /// Record a ballot, adding its weight to the matching tally.
    ///
    /// Veto ballots go to `veto_votes` only. Each voter gets one ballot, and
    /// no address's stake may back more than one ballot.
    pub fn add_ballot(&mut self, ballot: Ballot, now: u64) -> Result<()> {
        if !self.is_active(now) || self.outcome.is_some() {
            return Err(GovernanceError::NotActive);
        }
        if ballot.is_veto && !self.category.allows_veto() {
            return Err(GovernanceError::VetoNotApplicable);
        }
        if self.ballots.contains_key(&ballot.voter) {
            return Err(GovernanceError::AlreadyVoted(ballot.voter));
        }
        if let Some(counted) = ballot
            .represented
            .iter()
            .find(|address| self.represented.contains(*address))
        {
            return Err(GovernanceError::AlreadyVoted(counted.clone()));
        }

        let tally = if ballot.is_veto {
            &mut self.veto_votes
        } else if ballot.support {
            &mut self.votes_for
        } else {
            &mut self.votes_against
        };
        *tally = tally
            .checked_add(ballot.weight)
            .ok_or(GovernanceError::ArithmeticOverflow("vote tally"))?;

        self.represented.extend(ballot.represented.iter().cloned());
        self.ballots.insert(ballot.voter.clone(), ballot);
        Ok(())
    }

    pub fn ballot(&self, voter: &str) -> Option<&Ballot> {
        self.ballots.get(voter)
    }

    /// Number of distinct voters
    pub fn voter_count(&self) -> u64 {
        self.ballots.len() as u64
    }

    /// Whether `address`'s stake already backs a ballot
    pub fn is_counted(&self, address: &str) -> bool {
        self.represented.contains(address)
    }

    /// Number of addresses whose stake was counted, delegators included
    pub fn participant_count(&self) -> u64 {
        self.represented.len() as u64
    }

    /// Flip to executed; only valid once, from `Succeeded`
    pub fn mark_executed(&mut self) -> Result<()> {
        if self.executed {
            return Err(GovernanceError::AlreadyExecuted);
        }
        if self.outcome != Some(ProposalStatus::Succeeded) {
            return Err(GovernanceError::InvalidInput(format!(
                "proposal {} has not succeeded",
                self.id
            )));
        }
        self.executed = true;
        self.outcome = Some(ProposalStatus::Executed);
        Ok(())
    }
}
