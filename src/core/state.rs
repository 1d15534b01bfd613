//! States and the regions that partition composite states.

use super::action::Action;
use super::key::{EventKey, StateKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Kind of a concrete (resting) state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
    /// Leaf state without regions
    Simple,
    /// State owning exactly one region
    Composite,
    /// State owning two or more orthogonal regions
    Orthogonal,
    /// Final state of its region; owns no regions
    Final,
}

/// Identity of a region: the owning state (`None` for the machine itself)
/// and the region's position within the owner.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct RegionId<S: StateKey> {
    pub owner: Option<S>,
    pub index: usize,
}

impl<S: StateKey> RegionId<S> {
    /// The machine's top-level region.
    pub fn root() -> Self {
        Self {
            owner: None,
            index: 0,
        }
    }

    pub fn of(owner: S, index: usize) -> Self {
        Self {
            owner: Some(owner),
            index,
        }
    }

    pub fn is_root(&self) -> bool {
        self.owner.is_none()
    }
}

/// Initial pseudostate of a region: where default entry goes.
pub struct Initial<S: StateKey, E: EventKey, Env> {
    /// Target vertex, a state or a pseudostate inside the region
    pub target: S,
    pub actions: Vec<Action<S, E, Env>>,
}

impl<S: StateKey, E: EventKey, Env> Clone for Initial<S, E, Env> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            actions: self.actions.clone(),
        }
    }
}

/// A named partition of a composite state's substates.
pub struct Region<S: StateKey, E: EventKey, Env> {
    pub name: String,
    pub initial: Option<Initial<S, E, Env>>,
    /// Direct substates in declaration order
    pub states: Vec<S>,
}

impl<S: StateKey, E: EventKey, Env> Region<S, E, Env> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial: None,
            states: Vec::new(),
        }
    }
}

/// A concrete state of the model.
///
/// A state exclusively owns its regions and its entry and exit action
/// lists. Transitions refer to states by key only.
pub struct StateDef<S: StateKey, E: EventKey, Env> {
    pub key: S,
    pub kind: StateKind,
    /// Region this state lives in
    pub parent: RegionId<S>,
    pub regions: Vec<Region<S, E, Env>>,
    pub entry: Vec<Action<S, E, Env>>,
    pub exit: Vec<Action<S, E, Env>>,
    pub deferred: HashSet<E>,
}

impl<S: StateKey, E: EventKey, Env> StateDef<S, E, Env> {
    pub fn is_final(&self) -> bool {
        self.kind == StateKind::Final
    }

    pub fn is_leaf(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn defers(&self, event: &E) -> bool {
        self.deferred.contains(event)
    }

    pub fn region_ids(&self) -> impl Iterator<Item = RegionId<S>> + '_ {
        (0..self.regions.len()).map(move |index| RegionId::of(self.key.clone(), index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(kind: StateKind, regions: usize) -> StateDef<String, String, ()> {
        StateDef {
            key: "P".to_string(),
            kind,
            parent: RegionId::root(),
            regions: (0..regions).map(|i| Region::new(format!("r{i}"))).collect(),
            entry: Vec::new(),
            exit: Vec::new(),
            deferred: ["wait".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn region_ids_follow_declaration_order() {
        let def = state(StateKind::Orthogonal, 2);
        let ids: Vec<_> = def.region_ids().collect();

        assert_eq!(ids, vec![RegionId::of("P".to_string(), 0), RegionId::of("P".to_string(), 1)]);
        assert!(!def.is_leaf());
    }

    #[test]
    fn final_and_deferral_queries() {
        let def = state(StateKind::Final, 0);

        assert!(def.is_final());
        assert!(def.is_leaf());
        assert!(def.defers(&"wait".to_string()));
        assert!(!def.defers(&"go".to_string()));
    }

    #[test]
    fn root_region_has_no_owner() {
        let root: RegionId<String> = RegionId::root();
        assert!(root.is_root());
        assert!(!RegionId::of("P".to_string(), 0).is_root());
    }

    #[test]
    fn region_id_serializes_correctly() {
        let id = RegionId::of("P".to_string(), 1);
        let json = serde_json::to_string(&id).unwrap();
        let back: RegionId<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
