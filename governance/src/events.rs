//! Governance notifications for off-chain observers

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::proposal::{ProposalCategory, ProposalId, ProposalStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GovernanceEvent {
    ProposalCreated {
        proposal_id: ProposalId,
        creator: String,
        category: ProposalCategory,
        quorum_percentage: u8,
        total_stake_snapshot: u64,
        start_time: u64,
        end_time: u64,
    },
    VoteCast {
        proposal_id: ProposalId,
        voter: String,
        weight: u64,
        support: bool,
        is_veto: bool,
    },
    ProposalFinalized {
        proposal_id: ProposalId,
        status: ProposalStatus,
        participation_bps: u64,
    },
    ProposalExecuted {
        proposal_id: ProposalId,
    },
    /// Collaborator failed after the proposal was marked executed
    ExecutionFailed {
        proposal_id: ProposalId,
        reason: String,
    },
    QuorumRecalculated {
        category: ProposalCategory,
        quorum_percentage: u8,
    },
    DelegationChanged {
        delegator: String,
        delegatee: Option<String>,
    },
}

/// Fire-and-forget event consumer
pub trait EventSink: Send + Sync {
    fn emit(&self, event: GovernanceEvent);
}

/// Writes every event as a JSON line to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: GovernanceEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => log::info!(target: "governance::events", "{}", line),
            Err(e) => log::warn!("Failed to encode governance event {:?}: {}", event, e),
        }
    }
}

/// Buffers events in memory
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<GovernanceEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<GovernanceEvent> {
        self.events.lock().clone()
    }

    pub fn drain(&self) -> Vec<GovernanceEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: GovernanceEvent) {
        self.events.lock().push(event);
    }
}
