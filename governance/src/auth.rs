//! Capability checks for privileged proposals
//!
//! Parameter changes and emergency actions may only be proposed by actors
//! holding the matching capability. The caller presents an
//! `AuthorizationToken`, which the engine checks once at the entry point
//! against the live `Authorizer` so revocations take effect immediately.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{GovernanceError, Result};
use crate::proposal::ProposalCategory;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Action {
    ChangeMinorParameter,
    ChangeCriticalParameter,
    EmergencyAction,
}

impl Action {
    /// Capability needed to submit a proposal of this category, if any
    pub fn required_for(category: ProposalCategory) -> Option<Action> {
        match category {
            ProposalCategory::MinorParameter => Some(Action::ChangeMinorParameter),
            ProposalCategory::CriticalParameter => Some(Action::ChangeCriticalParameter),
            ProposalCategory::Emergency => Some(Action::EmergencyAction),
            ProposalCategory::General | ProposalCategory::Funding => None,
        }
    }
}

pub trait Authorizer: Send + Sync {
    fn is_authorized(&self, actor: &str, action: Action) -> bool;
}

/// Proof that `actor` held `action` when the token was issued
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationToken {
    actor: String,
    action: Action,
}

impl AuthorizationToken {
    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn action(&self) -> Action {
        self.action
    }
}

/// Check `token` authorizes `actor` for `action` right now
pub fn verify_token(
    authorizer: &dyn Authorizer,
    token: Option<&AuthorizationToken>,
    actor: &str,
    action: Action,
) -> Result<()> {
    let token = token.ok_or_else(|| {
        GovernanceError::Unauthorized(format!("{:?} requires an authorization token", action))
    })?;
    if token.actor != actor {
        return Err(GovernanceError::Unauthorized(format!(
            "token issued to {} presented by {}",
            token.actor, actor
        )));
    }
    if token.action != action {
        return Err(GovernanceError::Unauthorized(format!(
            "token grants {:?}, {:?} required",
            token.action, action
        )));
    }
    if !authorizer.is_authorized(actor, action) {
        return Err(GovernanceError::Unauthorized(format!(
            "{} no longer holds {:?}",
            actor, action
        )));
    }
    Ok(())
}

/// Grants and revokes capabilities, and issues tokens for held ones
#[derive(Default)]
pub struct CapabilityRegistry {
    grants: DashMap<String, HashSet<Action>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, actor: &str, action: Action) {
        self.grants
            .entry(actor.to_string())
            .or_default()
            .insert(action);
        log::info!("Capability {:?} granted to {}", action, actor);
    }

    pub fn revoke(&self, actor: &str, action: Action) -> bool {
        let removed = self
            .grants
            .get_mut(actor)
            .map(|mut actions| actions.remove(&action))
            .unwrap_or(false);
        if removed {
            log::info!("Capability {:?} revoked from {}", action, actor);
        }
        removed
    }

    pub fn issue(&self, actor: &str, action: Action) -> Result<AuthorizationToken> {
        if !self.is_authorized(actor, action) {
            return Err(GovernanceError::Unauthorized(format!(
                "{} does not hold {:?}",
                actor, action
            )));
        }
        Ok(AuthorizationToken {
            actor: actor.to_string(),
            action,
        })
    }
}

impl Authorizer for CapabilityRegistry {
    fn is_authorized(&self, actor: &str, action: Action) -> bool {
        self.grants
            .get(actor)
            .map(|actions| actions.contains(&action))
            .unwrap_or(false)
    }
}
