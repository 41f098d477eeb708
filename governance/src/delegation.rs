//! Delegation registry
//!
//! Each voter may hand their voting power to one delegatee. Edges form a
//! forest: self-delegation and cycles are rejected when an edge is created,
//! and no chain may grow past `max_depth` hops. Power resolution walks the
//! tree below a voter with an explicit stack.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::{GovernanceError, Result};

pub const DEFAULT_MAX_DELEGATION_DEPTH: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationRegistry {
    /// delegator -> delegatee
    delegates: HashMap<String, String>,
    /// delegatee -> direct delegators
    delegators: HashMap<String, BTreeSet<String>>,
    max_depth: usize,
}

impl Default for DelegationRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DELEGATION_DEPTH)
    }
}

impl DelegationRegistry {
    pub fn new(max_depth: usize) -> Self {
        Self {
            delegates: HashMap::new(),
            delegators: HashMap::new(),
            max_depth: max_depth.max(1),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Point `delegator`'s power at `delegatee`, replacing any earlier edge.
    ///
    /// Returns the previous delegatee, if there was one.
    pub fn set_delegate(&mut self, delegator: &str, delegatee: &str) -> Result<Option<String>> {
        if delegator.is_empty() || delegatee.is_empty() {
            return Err(GovernanceError::InvalidInput(
                "delegation addresses must not be empty".to_string(),
            ));
        }
        if delegator == delegatee {
            return Err(GovernanceError::SelfDelegation(delegator.to_string()));
        }

        // Hops from the delegatee up to the root of its chain
        let mut above = 0usize;
        let mut current = delegatee;
        loop {
            if current == delegator {
                return Err(GovernanceError::CycleDetected {
                    delegator: delegator.to_string(),
                    delegatee: delegatee.to_string(),
                });
            }
            match self.delegates.get(current) {
                Some(next) => {
                    above += 1;
                    if above >= self.max_depth {
                        return Err(GovernanceError::DelegationTooDeep {
                            depth: above + 1,
                            max: self.max_depth,
                        });
                    }
                    current = next.as_str();
                }
                None => break,
            }
        }

        let depth = self.height_below(delegator) + 1 + above;
        if depth > self.max_depth {
            return Err(GovernanceError::DelegationTooDeep {
                depth,
                max: self.max_depth,
            });
        }

        let previous = self.detach(delegator);
        self.delegates
            .insert(delegator.to_string(), delegatee.to_string());
        self.delegators
            .entry(delegatee.to_string())
            .or_default()
            .insert(delegator.to_string());

        log::info!("Delegation set: {} -> {}", delegator, delegatee);
        Ok(previous)
    }

    /// Remove `delegator`'s edge; no-op when none exists
    pub fn clear_delegate(&mut self, delegator: &str) -> Option<String> {
        let previous = self.detach(delegator);
        if let Some(ref delegatee) = previous {
            log::info!("Delegation cleared: {} -x-> {}", delegator, delegatee);
        }
        previous
    }

    pub fn delegate_of(&self, delegator: &str) -> Option<&str> {
        self.delegates.get(delegator).map(String::as_str)
    }

    pub fn has_delegated(&self, who: &str) -> bool {
        self.delegates.contains_key(who)
    }

    /// Direct delegators into `who`, sorted
    pub fn delegators_of(&self, who: &str) -> Vec<String> {
        self.delegators
            .get(who)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// End of `who`'s delegation chain (`who` itself when not delegating)
    pub fn ultimate_delegatee(&self, who: &str) -> String {
        let mut current = who;
        for _ in 0..self.max_depth {
            match self.delegates.get(current) {
                Some(next) => current = next.as_str(),
                None => break,
            }
        }
        current.to_string()
    }

    /// Effective power of `who`: its own base power plus that of everyone
    /// delegating into it, directly or transitively. Zero if `who` has
    /// delegated its power away.
    pub fn resolve_voting_power<F>(&self, who: &str, base_power: F) -> Result<u64>
    where
        F: Fn(&str) -> u64,
    {
        self.delegation_tree(who)?
            .into_iter()
            .try_fold(0u64, |total, node| total.checked_add(base_power(node)))
            .ok_or(GovernanceError::ArithmeticOverflow("delegated voting power"))
    }

    /// Every address whose power `who` exercises, `who` first.
    /// Empty if `who` has delegated its power away.
    pub fn represented_by(&self, who: &str) -> Result<Vec<String>> {
        Ok(self
            .delegation_tree(who)?
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    fn delegation_tree<'a>(&'a self, who: &'a str) -> Result<Vec<&'a str>> {
        if self.has_delegated(who) {
            return Ok(Vec::new());
        }

        let mut nodes = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<(&str, usize)> = vec![(who, 0)];

        while let Some((node, depth)) = stack.pop() {
            if !visited.insert(node) {
                return Err(GovernanceError::CycleDetected {
                    delegator: node.to_string(),
                    delegatee: who.to_string(),
                });
            }
            nodes.push(node);

            if let Some(children) = self.delegators.get(node) {
                if !children.is_empty() && depth >= self.max_depth {
                    return Err(GovernanceError::DelegationTooDeep {
                        depth: depth + 1,
                        max: self.max_depth,
                    });
                }
                for child in children.iter().rev() {
                    stack.push((child.as_str(), depth + 1));
                }
            }
        }

        Ok(nodes)
    }

    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }

    /// Longest chain of delegators ending at `who`, in hops
    fn height_below(&self, who: &str) -> usize {
        let mut height = 0;
        let mut level: Vec<&str> = vec![who];
        while !level.is_empty() && height <= self.max_depth {
            let next: Vec<&str> = level
                .iter()
                .filter_map(|node| self.delegators.get(*node))
                .flat_map(|set| set.iter().map(String::as_str))
                .collect();
            if next.is_empty() {
                break;
            }
            height += 1;
            level = next;
        }
        height
    }

    fn detach(&mut self, delegator: &str) -> Option<String> {
        let previous = self.delegates.remove(delegator)?;
        if let Some(set) = self.delegators.get_mut(&previous) {
            set.remove(delegator);
            if set.is_empty() {
                self.delegators.remove(&previous);
            }
        }
        Some(previous)
    }
}
