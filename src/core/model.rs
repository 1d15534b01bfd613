//! The immutable machine model consumed by the engine.
//!
//! A [`MachineModel`] is the finished graph of states, pseudostates,
//! regions and transitions. It is produced by
//! [`ModelBuilder`](crate::builder::ModelBuilder) and never mutated once the
//! engine starts. All queries here are pure.

use super::key::{EventKey, StateKey};
use super::pseudostate::PseudoState;
use super::state::{Region, RegionId, StateDef};
use super::transition::{Transition, Trigger};
use std::collections::HashMap;
use std::time::Duration;

/// A vertex of the graph: either a resting state or a pseudostate.
pub enum Vertex<'a, S: StateKey, E: EventKey, Env> {
    State(&'a StateDef<S, E, Env>),
    Pseudo(&'a PseudoState<S, E, Env>),
}

/// Timer metadata of a timed transition leaving a state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerSpec {
    pub transition: usize,
    pub period: Duration,
    pub count: Option<u32>,
}

pub struct MachineModel<S: StateKey, E: EventKey, Env> {
    root: Region<S, E, Env>,
    states: HashMap<S, StateDef<S, E, Env>>,
    pseudostates: HashMap<S, PseudoState<S, E, Env>>,
    transitions: Vec<Transition<S, E, Env>>,
    outgoing: HashMap<S, Vec<usize>>,
}

impl<S: StateKey, E: EventKey, Env> MachineModel<S, E, Env> {
    pub(crate) fn from_parts(
        root: Region<S, E, Env>,
        states: HashMap<S, StateDef<S, E, Env>>,
        pseudostates: HashMap<S, PseudoState<S, E, Env>>,
        transitions: Vec<Transition<S, E, Env>>,
    ) -> Self {
        let mut outgoing: HashMap<S, Vec<usize>> = HashMap::new();
        for (index, transition) in transitions.iter().enumerate() {
            outgoing
                .entry(transition.source.clone())
                .or_default()
                .push(index);
        }

        Self {
            root,
            states,
            pseudostates,
            transitions,
            outgoing,
        }
    }

    pub fn root(&self) -> &Region<S, E, Env> {
        &self.root
    }

    pub fn state(&self, key: &S) -> Option<&StateDef<S, E, Env>> {
        self.states.get(key)
    }

    pub fn pseudostate(&self, key: &S) -> Option<&PseudoState<S, E, Env>> {
        self.pseudostates.get(key)
    }

    pub fn vertex(&self, key: &S) -> Option<Vertex<'_, S, E, Env>> {
        self.states
            .get(key)
            .map(Vertex::State)
            .or_else(|| self.pseudostates.get(key).map(Vertex::Pseudo))
    }

    pub fn states(&self) -> impl Iterator<Item = &StateDef<S, E, Env>> {
        self.states.values()
    }

    pub fn transitions(&self) -> &[Transition<S, E, Env>] {
        &self.transitions
    }

    pub fn transition(&self, index: usize) -> Option<&Transition<S, E, Env>> {
        self.transitions.get(index)
    }

    /// Indices of transitions leaving `state`, in declaration order.
    pub fn outgoing(&self, state: &S) -> &[usize] {
        self.outgoing.get(state).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn region(&self, id: &RegionId<S>) -> Option<&Region<S, E, Env>> {
        match &id.owner {
            None if id.index == 0 => Some(&self.root),
            None => None,
            Some(owner) => self.states.get(owner)?.regions.get(id.index),
        }
    }

    /// `state` followed by its enclosing states, innermost first.
    pub fn lineage(&self, state: &S) -> Vec<S> {
        let mut chain = Vec::new();
        let mut current = self.states.get(state);
        while let Some(def) = current {
            if chain.len() > self.states.len() {
                break;
            }
            chain.push(def.key.clone());
            current = def
                .parent
                .owner
                .as_ref()
                .and_then(|owner| self.states.get(owner));
        }
        chain
    }

    /// Regions enclosing `state`, innermost first; the root region is last.
    pub fn enclosing_regions(&self, state: &S) -> Vec<RegionId<S>> {
        self.lineage(state)
            .iter()
            .filter_map(|key| self.states.get(key))
            .map(|def| def.parent.clone())
            .collect()
    }

    pub fn region_contains(&self, region: &RegionId<S>, state: &S) -> bool {
        self.enclosing_regions(state).contains(region)
    }

    /// True when `state` is strictly nested inside `ancestor`.
    pub fn is_descendant(&self, state: &S, ancestor: &S) -> bool {
        self.lineage(state).iter().skip(1).any(|s| s == ancestor)
    }

    /// The direct member of `region` that is `state` or encloses it.
    pub fn child_in_region(&self, region: &RegionId<S>, state: &S) -> Option<S> {
        self.lineage(state)
            .into_iter()
            .find(|key| self.states.get(key).is_some_and(|def| &def.parent == region))
    }

    /// True when transition `index` records an arrival at a join.
    pub fn feeds_join(&self, index: usize) -> bool {
        let Some(transition) = self.transitions.get(index) else {
            return false;
        };
        !transition.is_internal()
            && transition
                .target
                .as_ref()
                .and_then(|target| self.pseudostates.get(target))
                .is_some_and(|vertex| matches!(vertex, PseudoState::Join { .. }))
    }

    pub fn has_completion_transitions(&self, state: &S) -> bool {
        self.outgoing(state)
            .iter()
            .any(|&i| self.transitions[i].trigger.is_completion())
    }

    /// Timed transitions leaving `state`.
    pub fn timers(&self, state: &S) -> Vec<TimerSpec> {
        self.outgoing(state)
            .iter()
            .filter_map(|&i| match self.transitions[i].trigger {
                Trigger::Timer { period, count } => Some(TimerSpec {
                    transition: i,
                    period,
                    count,
                }),
                _ => None,
            })
            .collect()
    }
}

impl<S: StateKey, E: EventKey, Env> std::fmt::Debug for MachineModel<S, E, Env> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineModel")
            .field("states", &self.states.len())
            .field("pseudostates", &self.pseudostates.len())
            .field("transitions", &self.transitions.len())
            .finish()
    }
}
