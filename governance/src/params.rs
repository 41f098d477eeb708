//! Protocol parameter store
//!
//! Target of parameter-change proposals. Values are namespaced by target
//! (the subsystem owning the parameter) and name.

use dashmap::DashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParameterError {
    #[error("Unknown parameter {target}.{name}")]
    Unknown { target: String, name: String },

    #[error("Value {value} rejected for {target}.{name}: {reason}")]
    Rejected {
        target: String,
        name: String,
        value: u64,
        reason: String,
    },
}

pub trait ParameterStore: Send + Sync {
    fn update_parameter(&self, target: &str, name: &str, value: u64)
        -> Result<(), ParameterError>;

    fn get_parameter(&self, target: &str, name: &str) -> Option<u64>;
}

/// Parameters held in memory; optionally restricted to a known set of keys
#[derive(Default)]
pub struct InMemoryParameters {
    values: DashMap<(String, String), u64>,
    locked: bool,
}

impl InMemoryParameters {
    /// Store accepting any target/name
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that only updates parameters registered up front
    pub fn with_known(params: &[(&str, &str, u64)]) -> Self {
        let values = DashMap::new();
        for (target, name, value) in params {
            values.insert((target.to_string(), name.to_string()), *value);
        }
        Self {
            values,
            locked: true,
        }
    }
}

impl ParameterStore for InMemoryParameters {
    fn update_parameter(
        &self,
        target: &str,
        name: &str,
        value: u64,
    ) -> Result<(), ParameterError> {
        let key = (target.to_string(), name.to_string());
        if self.locked && !self.values.contains_key(&key) {
            return Err(ParameterError::Unknown {
                target: target.to_string(),
                name: name.to_string(),
            });
        }
        let previous = self.values.insert(key, value);
        log::info!(
            "Parameter {}.{} updated: {:?} -> {}",
            target,
            name,
            previous,
            value
        );
        Ok(())
    }

    fn get_parameter(&self, target: &str, name: &str) -> Option<u64> {
        self.values
            .get(&(target.to_string(), name.to_string()))
            .map(|v| *v)
    }
}
