//! Governance error types

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum GovernanceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    #[error("Self delegation is not allowed: {0}")]
    SelfDelegation(String),

    #[error("Delegating {delegator} to {delegatee} would create a cycle")]
    CycleDetected { delegator: String, delegatee: String },

    #[error("Delegation chain of depth {depth} exceeds maximum of {max}")]
    DelegationTooDeep { depth: usize, max: usize },

    #[error("Invalid participation rate: {0} basis points")]
    InvalidRate(u64),

    #[error("Missing payload: {0}")]
    MissingPayload(String),

    #[error("Proposal not found: {0}")]
    ProposalNotFound(u64),

    #[error("Proposal is not accepting votes")]
    NotActive,

    #[error("Voter {0} has already voted on this proposal")]
    AlreadyVoted(String),

    #[error("Veto votes are only accepted on critical parameter proposals")]
    VetoNotApplicable,

    #[error("Voting period has not ended")]
    NotEnded,

    #[error("Proposal already executed")]
    AlreadyExecuted,

    #[error("Quorum not met: {cast} weighted votes cast, {required} required")]
    QuorumNotMet { cast: u64, required: u64 },

    #[error("Proposal rejected: {votes_for} for, {votes_against} against")]
    Rejected { votes_for: u64, votes_against: u64 },

    #[error("Proposal vetoed: {veto_votes} veto votes, threshold {threshold}")]
    Vetoed { veto_votes: u64, threshold: u64 },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Execution of proposal {proposal_id} failed after it was marked executed: {reason}")]
    ExecutionFailed { proposal_id: u64, reason: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, GovernanceError>;
