//! Governance engine
//!
//! Owns the proposal state machine and wires the weight calculator,
//! delegation registry and adaptive quorum to the external collaborators:
//! the stake ledger, treasury, parameter store, authorizer and event sink.
//!
//! Every proposal sits behind its own mutex, so concurrent votes on the same
//! proposal are applied one at a time and no tally update is lost.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use treasury::{Treasury, TreasuryWithdrawal};

use crate::auth::{verify_token, Action, AuthorizationToken, Authorizer};
use crate::config::GovernanceConfig;
use crate::delegation::DelegationRegistry;
use crate::error::{GovernanceError, Result};
use crate::events::{EventSink, GovernanceEvent};
use crate::ledger::StakeLedger;
use crate::metrics::{EquityMetrics, InMemoryMetrics, MetricsState, MetricsStore};
use crate::params::ParameterStore;
use crate::proposal::{
    Ballot, Proposal, ProposalCategory, ProposalId, ProposalParams, ProposalPayload,
    ProposalStatus,
};
use crate::quorum::{AdaptiveQuorumEstimator, ParticipationHistory, ParticipationStore};
use crate::weight::{compute_weight_with, WeightParams};

/// External services the engine depends on
#[derive(Clone)]
pub struct Collaborators {
    pub ledger: Arc<dyn StakeLedger>,
    pub treasury: Arc<dyn Treasury>,
    pub parameters: Arc<dyn ParameterStore>,
    pub authorizer: Arc<dyn Authorizer>,
    pub events: Arc<dyn EventSink>,
}

/// Side effect carried out by a successful execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutedAction {
    None,
    Funding(TreasuryWithdrawal),
    ParameterChange {
        target: String,
        name: String,
        value: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    pub proposal_id: ProposalId,
    pub action: ExecutedAction,
}

/// Where a ballot's stake comes from
enum StakeSource {
    /// Caller-supplied stake of the voter alone
    Explicit(u64),
    /// Ledger stake of the voter and everyone delegating into it
    Delegated(Vec<String>),
}

/// Serializable copy of the engine's own state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceSnapshot {
    pub next_proposal_id: ProposalId,
    pub proposals: Vec<Proposal>,
    pub delegation: DelegationRegistry,
    /// Participation history and cached quorum per category
    pub participation: Vec<(ProposalCategory, ParticipationHistory)>,
    pub metrics: MetricsState,
}

pub struct Governance {
    config: GovernanceConfig,
    weight_params: WeightParams,
    proposals: DashMap<ProposalId, Arc<Mutex<Proposal>>>,
    next_id: AtomicU64,
    delegation: RwLock<DelegationRegistry>,
    participation: Arc<dyn ParticipationStore>,
    metrics: Arc<dyn MetricsStore>,
    collaborators: Collaborators,
}

impl Governance {
    /// Engine with in-memory participation and metrics stores
    pub fn new(config: GovernanceConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            weight_params: WeightParams::from(&config),
            proposals: DashMap::new(),
            next_id: AtomicU64::new(1),
            delegation: RwLock::new(DelegationRegistry::new(config.max_delegation_depth)),
            participation: Arc::new(AdaptiveQuorumEstimator::from_config(&config)),
            metrics: Arc::new(InMemoryMetrics::from_config(&config)),
            collaborators,
            config,
        })
    }

    pub fn with_participation_store(mut self, store: Arc<dyn ParticipationStore>) -> Self {
        self.participation = store;
        self
    }

    pub fn with_metrics_store(mut self, store: Arc<dyn MetricsStore>) -> Self {
        self.metrics = store;
        self
    }

    /// Rebuild an engine with the in-memory stores from a snapshot
    pub fn restore(
        snapshot: GovernanceSnapshot,
        config: GovernanceConfig,
        collaborators: Collaborators,
    ) -> Result<Self> {
        Ok(Self::new(config, collaborators)?.load_snapshot(snapshot))
    }

    /// Replace proposals, delegations, participation history and metrics
    /// with the snapshot's. Call after any `with_*_store`.
    pub fn load_snapshot(self, snapshot: GovernanceSnapshot) -> Self {
        self.proposals.clear();
        let mut next_id = snapshot.next_proposal_id.max(1);
        for proposal in snapshot.proposals {
            next_id = next_id.max(proposal.id.saturating_add(1));
            self.proposals
                .insert(proposal.id, Arc::new(Mutex::new(proposal)));
        }
        self.next_id.store(next_id, Ordering::SeqCst);
        *self.delegation.write() = snapshot.delegation;
        self.participation.load_histories(snapshot.participation);
        self.metrics.load_state(snapshot.metrics);

        log::info!(
            "Governance state loaded: {} proposals, next id {}",
            self.proposals.len(),
            next_id
        );
        self
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Proposal lifecycle
    // ------------------------------------------------------------------

    /// Create a proposal, snapshotting the category's cached quorum and the
    /// ledger's total stake.
    ///
    /// Parameter and emergency proposals need a token for the matching
    /// capability.
    pub fn submit(
        &self,
        creator: &str,
        description: &str,
        category: ProposalCategory,
        payload: ProposalPayload,
        token: Option<&AuthorizationToken>,
        now: u64,
    ) -> Result<ProposalId> {
        if creator.trim().is_empty() {
            return Err(GovernanceError::InvalidInput(
                "proposal creator is required".to_string(),
            ));
        }
        if let Some(action) = Action::required_for(category) {
            if let Err(e) = verify_token(
                self.collaborators.authorizer.as_ref(),
                token,
                creator,
                action,
            ) {
                log::warn!("Rejected {} proposal from {}: {}", category, creator, e);
                return Err(e);
            }
        }
        payload.validate_for(category)?;

        let start_time = now
            .checked_add(self.config.voting_delay_secs)
            .ok_or(GovernanceError::ArithmeticOverflow("proposal start time"))?;
        let quorum_percentage = self.participation.current_quorum(category);
        let total_stake_snapshot = self.collaborators.ledger.get_total_stake();

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let proposal = Proposal::new(ProposalParams {
            id,
            creator: creator.to_string(),
            description: description.to_string(),
            category,
            payload,
            quorum_percentage,
            veto_threshold_percent: self.config.veto_threshold_percent,
            total_stake_snapshot,
            start_time,
            voting_duration: self.config.voting_period(category),
        })?;

        let event = GovernanceEvent::ProposalCreated {
            proposal_id: id,
            creator: proposal.creator.clone(),
            category,
            quorum_percentage,
            total_stake_snapshot,
            start_time: proposal.start_time,
            end_time: proposal.end_time,
        };
        log::info!(
            "Proposal #{} created by {}: {} (quorum {}% of {}, voting {}..{})",
            id,
            creator,
            category,
            quorum_percentage,
            total_stake_snapshot,
            proposal.start_time,
            proposal.end_time
        );

        self.proposals.insert(id, Arc::new(Mutex::new(proposal)));
        self.collaborators.events.emit(event);
        Ok(id)
    }

    /// Vote with the voter's ledger stake plus everything delegated to them.
    ///
    /// Addresses whose stake already backs another ballot on this proposal,
    /// and addresses holding no stake, are left out of the ballot.
    pub fn vote(
        &self,
        proposal_id: ProposalId,
        voter: &str,
        support: bool,
        is_veto: bool,
        now: u64,
    ) -> Result<u64> {
        let represented = {
            let delegation = self.delegation.read();
            if let Some(delegatee) = delegation.delegate_of(voter) {
                return Err(GovernanceError::InvalidInput(format!(
                    "{} has delegated voting power to {}",
                    voter, delegatee
                )));
            }
            delegation.represented_by(voter)?
        };
        let reputation = self.collaborators.ledger.get_reputation(voter);

        self.record_ballot(
            proposal_id,
            voter,
            StakeSource::Delegated(represented),
            reputation,
            support,
            is_veto,
            now,
        )
    }

    /// Vote with an explicit stake and reputation; returns the weight counted
    #[allow(clippy::too_many_arguments)]
    pub fn cast_vote(
        &self,
        proposal_id: ProposalId,
        voter: &str,
        stake: u64,
        reputation: u64,
        support: bool,
        is_veto: bool,
        now: u64,
    ) -> Result<u64> {
        self.record_ballot(
            proposal_id,
            voter,
            StakeSource::Explicit(stake),
            reputation,
            support,
            is_veto,
            now,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn record_ballot(
        &self,
        proposal_id: ProposalId,
        voter: &str,
        source: StakeSource,
        reputation: u64,
        support: bool,
        is_veto: bool,
        now: u64,
    ) -> Result<u64> {
        if voter.trim().is_empty() {
            return Err(GovernanceError::InvalidInput("voter is required".to_string()));
        }
        let handle = self.handle(proposal_id)?;
        let (stake, weight) = {
            let mut proposal = handle.lock();
            if !proposal.is_active(now) || proposal.outcome.is_some() {
                return Err(GovernanceError::NotActive);
            }
            if is_veto && !proposal.category.allows_veto() {
                return Err(GovernanceError::VetoNotApplicable);
            }

            let (stake, represented) = match source {
                StakeSource::Explicit(stake) => (stake, vec![voter.to_string()]),
                StakeSource::Delegated(addresses) => {
                    match self.uncounted_stake(&proposal, voter, addresses) {
                        Ok(resolved) => resolved,
                        Err(e) => {
                            log::warn!(
                                "Vote on proposal #{} from {} rejected: {}",
                                proposal_id,
                                voter,
                                e
                            );
                            return Err(e);
                        }
                    }
                }
            };

            let elapsed = now - proposal.start_time;
            let weight = compute_weight_with(
                &self.weight_params,
                stake,
                reputation,
                elapsed,
                proposal.voting_duration,
            )?;

            if let Err(e) = proposal.add_ballot(
                Ballot {
                    voter: voter.to_string(),
                    stake,
                    weight,
                    support,
                    is_veto,
                    cast_at: now,
                    represented,
                },
                now,
            ) {
                if matches!(e, GovernanceError::AlreadyVoted(_)) {
                    log::warn!("Duplicate vote on proposal #{} from {}: {}", proposal_id, voter, e);
                }
                return Err(e);
            }
            (stake, weight)
        };

        if let Err(e) = self.metrics.record_vote(voter, stake, weight) {
            log::warn!("Equity metrics not updated for {}: {}", voter, e);
        }

        log::info!(
            "Vote on proposal #{} by {}: weight {} ({})",
            proposal_id,
            voter,
            weight,
            if is_veto {
                "veto"
            } else if support {
                "for"
            } else {
                "against"
            }
        );
        self.collaborators.events.emit(GovernanceEvent::VoteCast {
            proposal_id,
            voter: voter.to_string(),
            weight,
            support,
            is_veto,
        });
        Ok(weight)
    }

    /// Ledger stake of `addresses` not yet counted on `proposal`.
    ///
    /// Zero-stake addresses are dropped so they never count as participants.
    fn uncounted_stake(
        &self,
        proposal: &Proposal,
        voter: &str,
        addresses: Vec<String>,
    ) -> Result<(u64, Vec<String>)> {
        if proposal.ballot(voter).is_some() || proposal.is_counted(voter) {
            return Err(GovernanceError::AlreadyVoted(voter.to_string()));
        }

        let ledger = &self.collaborators.ledger;
        let mut stake = 0u64;
        let mut counted = Vec::with_capacity(addresses.len());
        for address in addresses {
            if proposal.is_counted(&address) {
                continue;
            }
            let held = ledger.get_stake(&address);
            if held == 0 {
                continue;
            }
            stake = stake
                .checked_add(held)
                .ok_or(GovernanceError::ArithmeticOverflow("delegated voting power"))?;
            counted.push(address);
        }
        Ok((stake, counted))
    }

    /// Settle a proposal whose window has closed.
    ///
    /// The first call stores the outcome and feeds participation into the
    /// adaptive quorum history; later calls return the stored outcome.
    pub fn finalize(&self, proposal_id: ProposalId, now: u64) -> Result<ProposalStatus> {
        let handle = self.handle(proposal_id)?;
        let (status, category, participants) = {
            let mut proposal = handle.lock();
            if let Some(outcome) = proposal.outcome {
                return Ok(outcome);
            }
            if !proposal.has_ended(now) {
                return Err(GovernanceError::NotEnded);
            }
            let status = proposal.evaluate();
            proposal.outcome = Some(status);
            (status, proposal.category, proposal.participant_count())
        };

        let eligible = self.collaborators.ledger.eligible_voters();
        let participation_bps =
            match self
                .participation
                .record_participation(category, participants, eligible)
            {
                Ok(rate) => {
                    self.metrics.record_finalization(rate);
                    rate
                }
                Err(e) => {
                    log::warn!(
                        "Participation for proposal #{} not recorded ({} of {}): {}",
                        proposal_id,
                        participants,
                        eligible,
                        e
                    );
                    0
                }
            };

        log::info!(
            "Proposal #{} finalized: {:?} ({} bps participation)",
            proposal_id,
            status,
            participation_bps
        );
        self.collaborators
            .events
            .emit(GovernanceEvent::ProposalFinalized {
                proposal_id,
                status,
                participation_bps,
            });
        Ok(status)
    }

    /// Execute a succeeded proposal.
    ///
    /// The proposal is marked executed before the treasury or parameter
    /// store is called. If that call fails the flag stays set and the
    /// failure is reported as `ExecutionFailed` for manual remediation.
    pub fn execute(&self, proposal_id: ProposalId, now: u64) -> Result<ExecutionReceipt> {
        self.finalize(proposal_id, now)?;

        let handle = self.handle(proposal_id)?;
        let payload = {
            let mut proposal = handle.lock();
            if proposal.executed {
                return Err(GovernanceError::AlreadyExecuted);
            }
            let status = proposal.status(now);
            if let Some(err) = proposal.outcome_error(status) {
                return Err(err);
            }
            proposal.mark_executed()?;
            proposal.payload.clone()
        };

        let dispatched = match payload {
            ProposalPayload::None => Ok(ExecutedAction::None),
            ProposalPayload::Funding { amount, recipient } => self
                .collaborators
                .treasury
                .withdraw(amount, &recipient, now)
                .map(ExecutedAction::Funding)
                .map_err(|e| e.to_string()),
            ProposalPayload::ParameterChange {
                target,
                name,
                value,
            } => self
                .collaborators
                .parameters
                .update_parameter(&target, &name, value)
                .map(|_| ExecutedAction::ParameterChange {
                    target,
                    name,
                    value,
                })
                .map_err(|e| e.to_string()),
        };

        match dispatched {
            Ok(action) => {
                log::info!("Proposal #{} executed: {:?}", proposal_id, action);
                self.collaborators
                    .events
                    .emit(GovernanceEvent::ProposalExecuted { proposal_id });
                Ok(ExecutionReceipt {
                    proposal_id,
                    action,
                })
            }
            Err(reason) => {
                log::error!(
                    "FATAL: proposal #{} marked executed but its action failed: {}",
                    proposal_id,
                    reason
                );
                self.collaborators
                    .events
                    .emit(GovernanceEvent::ExecutionFailed {
                        proposal_id,
                        reason: reason.clone(),
                    });
                Err(GovernanceError::ExecutionFailed {
                    proposal_id,
                    reason,
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Adaptive quorum
    // ------------------------------------------------------------------

    /// Recompute the category's quorum from its history and cache it for
    /// proposals created from now on
    pub fn update_adaptive_quorum(&self, category: ProposalCategory) -> u8 {
        let quorum_percentage = self.participation.update_adaptive_quorum(category);
        self.collaborators
            .events
            .emit(GovernanceEvent::QuorumRecalculated {
                category,
                quorum_percentage,
            });
        quorum_percentage
    }

    /// Quorum a proposal of this category would get if created now
    pub fn current_quorum(&self, category: ProposalCategory) -> u8 {
        self.participation.current_quorum(category)
    }

    pub fn participation_history(&self, category: ProposalCategory) -> Vec<u64> {
        self.participation.history(category)
    }

    // ------------------------------------------------------------------
    // Delegation
    // ------------------------------------------------------------------

    pub fn set_delegate(&self, delegator: &str, delegatee: &str) -> Result<()> {
        let result = self.delegation.write().set_delegate(delegator, delegatee);
        match result {
            Ok(_) => {
                self.collaborators
                    .events
                    .emit(GovernanceEvent::DelegationChanged {
                        delegator: delegator.to_string(),
                        delegatee: Some(delegatee.to_string()),
                    });
                Ok(())
            }
            Err(e) => {
                log::warn!("Delegation {} -> {} rejected: {}", delegator, delegatee, e);
                Err(e)
            }
        }
    }

    pub fn clear_delegate(&self, delegator: &str) -> Option<String> {
        let previous = self.delegation.write().clear_delegate(delegator);
        if previous.is_some() {
            self.collaborators
                .events
                .emit(GovernanceEvent::DelegationChanged {
                    delegator: delegator.to_string(),
                    delegatee: None,
                });
        }
        previous
    }

    pub fn delegate_of(&self, delegator: &str) -> Option<String> {
        self.delegation.read().delegate_of(delegator).map(str::to_string)
    }

    /// Ledger stake `who` votes with, delegations included
    pub fn voting_power(&self, who: &str) -> Result<u64> {
        let ledger = &self.collaborators.ledger;
        self.delegation
            .read()
            .resolve_voting_power(who, |address| ledger.get_stake(address))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn proposal(&self, proposal_id: ProposalId) -> Option<Proposal> {
        let handle = self.proposals.get(&proposal_id).map(|p| p.value().clone())?;
        let proposal = handle.lock().clone();
        Some(proposal)
    }

    pub fn status(&self, proposal_id: ProposalId, now: u64) -> Result<ProposalStatus> {
        Ok(self.handle(proposal_id)?.lock().status(now))
    }

    pub fn proposals_by_status(&self, status: ProposalStatus, now: u64) -> Vec<Proposal> {
        let mut matching: Vec<Proposal> = self
            .handles()
            .into_iter()
            .filter_map(|handle| {
                let proposal = handle.lock();
                if proposal.status(now) == status {
                    Some(proposal.clone())
                } else {
                    None
                }
            })
            .collect();
        matching.sort_by_key(|p| p.id);
        matching
    }

    pub fn proposal_count(&self) -> usize {
        self.proposals.len()
    }

    pub fn metrics(&self) -> EquityMetrics {
        self.metrics.snapshot()
    }

    pub fn snapshot(&self) -> GovernanceSnapshot {
        let mut proposals: Vec<Proposal> = self
            .handles()
            .into_iter()
            .map(|handle| handle.lock().clone())
            .collect();
        proposals.sort_by_key(|p| p.id);

        GovernanceSnapshot {
            next_proposal_id: self.next_id.load(Ordering::SeqCst),
            proposals,
            delegation: self.delegation.read().clone(),
            participation: self.participation.export_histories(),
            metrics: self.metrics.export_state(),
        }
    }

    fn handle(&self, proposal_id: ProposalId) -> Result<Arc<Mutex<Proposal>>> {
        // Clone the Arc so the map shard is not held while the proposal is locked
        self.proposals
            .get(&proposal_id)
            .map(|entry| entry.value().clone())
            .ok_or(GovernanceError::ProposalNotFound(proposal_id))
    }

    fn handles(&self) -> Vec<Arc<Mutex<Proposal>>> {
        self.proposals
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
