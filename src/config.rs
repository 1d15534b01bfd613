//! Engine configuration.
//!
//! Configuration is explicit: it is passed to the machine builder and never
//! looked up ambiently. It can be assembled with setters or deserialized
//! from JSON, where every field is optional.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration parsing failed: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Tunables of a running machine.
///
/// # Example
///
/// ```rust
/// use statecraft::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{ "machine_id": "door", "journal_capacity": 16 }"#).unwrap();
/// assert_eq!(config.machine_id, "door");
/// assert_eq!(config.max_resolution_depth, 64);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Identifier used in logs and snapshots
    pub machine_id: String,
    /// Upper bound on completion and replay steps triggered by one event
    pub max_run_to_completion_steps: usize,
    /// Upper bound on pseudostates visited while resolving one target
    pub max_resolution_depth: usize,
    /// Maximum deferred events held; `None` is unbounded
    pub deferred_capacity: Option<usize>,
    /// Committed transitions retained in the journal
    pub journal_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            machine_id: uuid::Uuid::new_v4().to_string(),
            max_run_to_completion_steps: 1000,
            max_resolution_depth: 64,
            deferred_capacity: None,
            journal_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_run_to_completion_steps == 0 {
            return Err(ConfigError::Invalid(
                "max_run_to_completion_steps must be positive".to_string(),
            ));
        }
        if self.max_resolution_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_resolution_depth must be positive".to_string(),
            ));
        }
        if self.journal_capacity == 0 {
            return Err(ConfigError::Invalid("journal_capacity must be positive".to_string()));
        }
        Ok(())
    }

    pub fn machine_id(mut self, id: impl Into<String>) -> Self {
        self.machine_id = id.into();
        self
    }

    pub fn max_run_to_completion_steps(mut self, steps: usize) -> Self {
        self.max_run_to_completion_steps = steps;
        self
    }

    pub fn max_resolution_depth(mut self, depth: usize) -> Self {
        self.max_resolution_depth = depth;
        self
    }

    pub fn deferred_capacity(mut self, capacity: usize) -> Self {
        self.deferred_capacity = Some(capacity);
        self
    }

    pub fn journal_capacity(mut self, capacity: usize) -> Self {
        self.journal_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.machine_id.is_empty());
        assert_eq!(config.deferred_capacity, None);
    }

    #[test]
    fn json_fields_are_optional() {
        let config = EngineConfig::from_json(r#"{ "deferred_capacity": 4 }"#).unwrap();
        assert_eq!(config.deferred_capacity, Some(4));
        assert_eq!(config.max_run_to_completion_steps, 1000);
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let result = EngineConfig::from_json("{ not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn zero_bounds_are_rejected() {
        let result = EngineConfig::from_json(r#"{ "max_resolution_depth": 0 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn setters_chain() {
        let config = EngineConfig::new()
            .machine_id("m-1")
            .journal_capacity(8)
            .deferred_capacity(2)
            .max_run_to_completion_steps(10)
            .max_resolution_depth(5);

        assert_eq!(config.machine_id, "m-1");
        assert_eq!(config.journal_capacity, 8);
        assert_eq!(config.deferred_capacity, Some(2));
        assert_eq!(config.max_run_to_completion_steps, 10);
        assert_eq!(config.max_resolution_depth, 5);
    }
}
