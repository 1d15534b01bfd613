//! Runtime configuration of a running machine.

use super::deferred::DeferredQueue;
use crate::core::{EventKey, MachineModel, RegionId, StateKey, Variables};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a region contained when it was last exited.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct RegionMemory<S: StateKey> {
    /// The region's direct substate (shallow history)
    pub direct: S,
    /// Every active leaf below the region (deep history)
    pub leaves: Vec<S>,
}

/// Mutable state owned by the event processor.
///
/// A transition works on a clone of the configuration and swaps it in only
/// once every resolution step succeeded, so an aborted transition leaves the
/// committed configuration untouched.
#[derive(Clone, Debug)]
pub struct Configuration<S: StateKey, E: EventKey> {
    pub(crate) active: HashMap<RegionId<S>, S>,
    pub(crate) history: HashMap<RegionId<S>, RegionMemory<S>>,
    /// Join key to the sources that have arrived since it last fired
    pub(crate) joins: HashMap<S, Vec<S>>,
    pub(crate) deferred: DeferredQueue<E>,
    pub(crate) variables: Variables,
}

impl<S: StateKey, E: EventKey> Configuration<S, E> {
    pub fn new(deferred_capacity: Option<usize>) -> Self {
        Self {
            active: HashMap::new(),
            history: HashMap::new(),
            joins: HashMap::new(),
            deferred: DeferredQueue::new(deferred_capacity),
            variables: Variables::new(),
        }
    }

    pub fn active_in(&self, region: &RegionId<S>) -> Option<&S> {
        self.active.get(region)
    }

    pub fn memory(&self, region: &RegionId<S>) -> Option<&RegionMemory<S>> {
        self.history.get(region)
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn deferred(&self) -> &DeferredQueue<E> {
        &self.deferred
    }

    pub fn arrivals(&self, join: &S) -> &[S] {
        self.joins.get(join).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_active<Env>(&self, model: &MachineModel<S, E, Env>, state: &S) -> bool {
        model
            .state(state)
            .is_some_and(|def| self.active.get(&def.parent) == Some(state))
    }

    /// Active states below `region`, parents before children and regions
    /// in declaration order.
    pub fn active_below<Env>(&self, model: &MachineModel<S, E, Env>, region: &RegionId<S>) -> Vec<S> {
        let mut ordered = Vec::new();
        let mut stack = vec![region.clone()];

        while let Some(region) = stack.pop() {
            let Some(state) = self.active.get(&region) else {
                continue;
            };
            ordered.push(state.clone());
            if let Some(def) = model.state(state) {
                let mut children: Vec<_> = def.region_ids().collect();
                children.reverse();
                stack.extend(children);
            }
        }

        ordered
    }

    /// Every active state of the machine in deterministic order.
    pub fn active_states<Env>(&self, model: &MachineModel<S, E, Env>) -> Vec<S> {
        self.active_below(model, &RegionId::root())
    }

    /// Active states without regions of their own.
    pub fn active_leaves<Env>(&self, model: &MachineModel<S, E, Env>, region: &RegionId<S>) -> Vec<S> {
        self.active_below(model, region)
            .into_iter()
            .filter(|s| model.state(s).is_some_and(|def| def.is_leaf()))
            .collect()
    }

    /// True when any active state declares `event` deferred.
    pub fn defers<Env>(&self, model: &MachineModel<S, E, Env>, event: &E) -> bool {
        self.active_states(model)
            .iter()
            .filter_map(|s| model.state(s))
            .any(|def| def.defers(event))
    }
}
