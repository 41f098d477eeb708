//! Stake-weighted governance
//!
//! Proposal lifecycle with quadratic, time- and reputation-weighted voting,
//! transitive delegation and a participation-adaptive quorum. Funding
//! proposals pay out through the `treasury` crate; parameter changes go to a
//! `ParameterStore`.

pub mod auth;
pub mod config;
pub mod delegation;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod metrics;
pub mod params;
pub mod proposal;
pub mod quorum;
pub mod weight;

pub use auth::{Action, AuthorizationToken, Authorizer, CapabilityRegistry};
pub use config::{BaseQuorums, ConfigError, GovernanceConfig};
pub use delegation::DelegationRegistry;
pub use engine::{Collaborators, ExecutedAction, ExecutionReceipt, Governance, GovernanceSnapshot};
pub use error::{GovernanceError, Result};
pub use events::{EventSink, GovernanceEvent, LogEventSink, MemoryEventSink};
pub use ledger::{InMemoryStakeLedger, StakeLedger};
pub use metrics::{EquityMetrics, InMemoryMetrics, MetricsState, MetricsStore};
pub use params::{InMemoryParameters, ParameterError, ParameterStore};
pub use proposal::{
    Ballot, Proposal, ProposalCategory, ProposalId, ProposalPayload, ProposalStatus,
};
pub use quorum::{AdaptiveQuorumEstimator, ParticipationHistory, ParticipationStore};
pub use weight::{compute_weight, WeightParams};
