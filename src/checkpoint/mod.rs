//! Snapshot and restore for running machines.
//!
//! A [`Snapshot`] captures everything the engine needs to resume without
//! re-running the initial transition: the active state of every region,
//! history memory, pending join arrivals, deferred events and extended
//! variables. Guards and actions are not serializable and live in the model.

use crate::core::{EventKey, MachineModel, RegionId, StateKey, Variables};
use crate::engine::{Configuration, DeferredEvent, RegionMemory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub mod error;
pub mod persist;

pub use error::CheckpointError;
pub use persist::{InMemoryPersister, StatePersister};

/// Version identifier for snapshot format
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable snapshot of a machine's runtime configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Snapshot<S: StateKey, E: EventKey> {
    /// Snapshot format version
    pub version: u32,

    /// Unique snapshot identifier
    pub id: String,

    /// Machine the snapshot was taken from
    pub machine_id: String,

    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,

    /// Active state per region, parents before children
    pub active: Vec<(RegionId<S>, S)>,

    /// Last exited content per region
    pub history: Vec<(RegionId<S>, RegionMemory<S>)>,

    /// Join arrivals not yet consumed
    pub joins: Vec<(S, Vec<S>)>,

    /// Deferred events in arrival order
    pub deferred: Vec<DeferredEvent<E>>,

    /// Extended state variables
    pub variables: Variables,
}

/// Binary layout: `serde_json::Value` cannot be decoded by bincode, so
/// variables and payloads travel as JSON text.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
struct BinarySnapshot<S: StateKey, E: EventKey> {
    version: u32,
    id: String,
    machine_id: String,
    timestamp: DateTime<Utc>,
    active: Vec<(RegionId<S>, S)>,
    history: Vec<(RegionId<S>, RegionMemory<S>)>,
    joins: Vec<(S, Vec<S>)>,
    deferred: Vec<(E, Option<String>)>,
    variables: String,
}

impl<S: StateKey, E: EventKey> Snapshot<S, E> {
    pub fn new(machine_id: impl Into<String>, active: Vec<(RegionId<S>, S)>, variables: Variables) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            id: uuid::Uuid::new_v4().to_string(),
            machine_id: machine_id.into(),
            timestamp: Utc::now(),
            active,
            history: Vec::new(),
            joins: Vec::new(),
            deferred: Vec::new(),
            variables,
        }
    }

    pub(crate) fn capture<Env>(
        machine_id: &str,
        model: &MachineModel<S, E, Env>,
        config: &Configuration<S, E>,
    ) -> Self {
        let active = config
            .active_states(model)
            .into_iter()
            .filter_map(|state| model.state(&state).map(|def| (def.parent.clone(), state)))
            .collect();

        let mut snapshot = Self::new(machine_id, active, config.variables.clone());
        snapshot.history = config
            .history
            .iter()
            .map(|(region, memory)| (region.clone(), memory.clone()))
            .collect();
        snapshot.joins = config
            .joins
            .iter()
            .map(|(join, arrived)| (join.clone(), arrived.clone()))
            .collect();
        snapshot.deferred = config.deferred.iter().cloned().collect();
        snapshot
    }

    /// Active states in the order they were captured.
    pub fn active_states(&self) -> Vec<S> {
        self.active.iter().map(|(_, state)| state.clone()).collect()
    }

    /// Check that the snapshot describes a configuration of `model`.
    pub fn validate<Env>(&self, model: &MachineModel<S, E, Env>) -> Result<(), CheckpointError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                supported: SNAPSHOT_VERSION,
            });
        }

        let mut occupied: HashSet<&RegionId<S>> = HashSet::new();
        for (region, state) in &self.active {
            if !occupied.insert(region) {
                return Err(CheckpointError::ValidationFailed(format!(
                    "region {region:?} has more than one active state"
                )));
            }
            let def = model.state(state).ok_or_else(|| {
                CheckpointError::ValidationFailed(format!("unknown state {state:?}"))
            })?;
            if &def.parent != region {
                return Err(CheckpointError::ValidationFailed(format!(
                    "state {state:?} does not belong to region {region:?}"
                )));
            }
            if let Some(owner) = &region.owner {
                if !self.active.iter().any(|(_, s)| s == owner) {
                    return Err(CheckpointError::ValidationFailed(format!(
                        "state {state:?} is active but its parent {owner:?} is not"
                    )));
                }
            }
        }

        if !occupied.contains(&RegionId::root()) {
            return Err(CheckpointError::ValidationFailed(
                "no active state in the top-level region".to_string(),
            ));
        }
        for (_, state) in &self.active {
            let Some(def) = model.state(state) else {
                continue;
            };
            if let Some(region) = def.region_ids().find(|region| !occupied.contains(region)) {
                return Err(CheckpointError::ValidationFailed(format!(
                    "region {region:?} of active state {state:?} has no active state"
                )));
            }
        }

        let remembered = self
            .history
            .iter()
            .flat_map(|(_, memory)| std::iter::once(&memory.direct).chain(memory.leaves.iter()));
        for state in remembered {
            if model.state(state).is_none() {
                return Err(CheckpointError::ValidationFailed(format!(
                    "history refers to unknown state {state:?}"
                )));
            }
        }

        for (join, _) in &self.joins {
            if model.pseudostate(join).is_none() {
                return Err(CheckpointError::ValidationFailed(format!("unknown join {join:?}")));
            }
        }

        Ok(())
    }

    pub(crate) fn into_configuration(self, deferred_capacity: Option<usize>) -> Configuration<S, E> {
        let mut config = Configuration::new(deferred_capacity);
        config.active = self.active.into_iter().collect();
        config.history = self.history.into_iter().collect();
        config.joins = self.joins.into_iter().collect();
        for event in self.deferred {
            if !config.deferred.push(event) {
                tracing::warn!("deferred queue full while restoring snapshot");
                break;
            }
        }
        config.variables = self.variables;
        config
    }

    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string(self).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        let snapshot: Self = serde_json::from_str(json)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        let to_text = |value: &serde_json::Value| -> Result<String, CheckpointError> {
            serde_json::to_string(value).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
        };

        let deferred = self
            .deferred
            .iter()
            .map(|d| -> Result<(E, Option<String>), CheckpointError> {
                Ok((d.event.clone(), d.payload.as_ref().map(to_text).transpose()?))
            })
            .collect::<Result<Vec<_>, CheckpointError>>()?;

        let wire = BinarySnapshot {
            version: self.version,
            id: self.id.clone(),
            machine_id: self.machine_id.clone(),
            timestamp: self.timestamp,
            active: self.active.clone(),
            history: self.history.clone(),
            joins: self.joins.clone(),
            deferred,
            variables: serde_json::to_string(&self.variables)
                .map_err(|e| CheckpointError::SerializationFailed(e.to_string()))?,
        };

        bincode::serialize(&wire).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let from_text = |text: &str| -> Result<serde_json::Value, CheckpointError> {
            serde_json::from_str(text).map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))
        };

        let wire: BinarySnapshot<S, E> = bincode::deserialize(bytes)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;

        let deferred = wire
            .deferred
            .into_iter()
            .map(|(event, payload)| -> Result<DeferredEvent<E>, CheckpointError> {
                Ok(DeferredEvent {
                    event,
                    payload: payload.as_deref().map(from_text).transpose()?,
                })
            })
            .collect::<Result<Vec<_>, CheckpointError>>()?;

        let snapshot = Self {
            version: wire.version,
            id: wire.id,
            machine_id: wire.machine_id,
            timestamp: wire.timestamp,
            active: wire.active,
            history: wire.history,
            joins: wire.joins,
            deferred,
            variables: serde_json::from_str(&wire.variables)
                .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?,
        };
        snapshot.check_version()?;
        Ok(snapshot)
    }

    fn check_version(&self) -> Result<(), CheckpointError> {
        if self.version == SNAPSHOT_VERSION {
            Ok(())
        } else {
            Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                supported: SNAPSHOT_VERSION,
            })
        }
    }
}
