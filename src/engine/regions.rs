//! Region coordinator: entering and exiting regions, keeping history memory
//! current and detecting completion.

use super::configuration::{Configuration, RegionMemory};
use crate::core::{EventKey, MachineModel, RegionId, StateKey};

/// Completion raised by entering states.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion<S> {
    /// The state finished; its completion transitions become eligible
    State(S),
    /// A final state of the top-level region was reached
    Machine,
}

/// Exit everything active below `region`, innermost first.
///
/// History memory is recorded for the region and for every nested region
/// being left, before anything is removed. Join arrivals of exited states
/// are discarded. Returns the exited states in exit order.
pub fn exit_region<S: StateKey, E: EventKey, Env>(
    model: &MachineModel<S, E, Env>,
    config: &mut Configuration<S, E>,
    region: &RegionId<S>,
) -> Vec<S> {
    let entered_order = config.active_below(model, region);
    if entered_order.is_empty() {
        return entered_order;
    }

    let mut regions = vec![region.clone()];
    for state in &entered_order {
        if let Some(def) = model.state(state) {
            regions.extend(def.region_ids());
        }
    }

    for id in regions {
        if let Some(direct) = config.active.get(&id).cloned() {
            let leaves = config.active_leaves(model, &id);
            config.history.insert(id, RegionMemory { direct, leaves });
        }
    }

    let mut exited = entered_order;
    exited.reverse();
    for state in &exited {
        if let Some(def) = model.state(state) {
            config.active.remove(&def.parent);
        }
    }

    config.joins.retain(|_, arrived| {
        arrived.retain(|source| !exited.contains(source));
        !arrived.is_empty()
    });

    exited
}

/// Mark `state` as the active substate of its region.
pub fn enter_state<S: StateKey, E: EventKey, Env>(
    model: &MachineModel<S, E, Env>,
    config: &mut Configuration<S, E>,
    state: &S,
) {
    if let Some(def) = model.state(state) {
        config.active.insert(def.parent.clone(), state.clone());
    }
}

/// True once every region of `state` rests in a final state.
pub fn is_complete<S: StateKey, E: EventKey, Env>(
    model: &MachineModel<S, E, Env>,
    config: &Configuration<S, E>,
    state: &S,
) -> bool {
    let Some(def) = model.state(state) else {
        return false;
    };
    if def.is_leaf() {
        return false;
    }

    def.region_ids().all(|region| {
        config
            .active_in(&region)
            .and_then(|active| model.state(active))
            .is_some_and(|active| active.is_final())
    })
}

/// Completions raised by `entered`, in entry order and without duplicates.
pub fn completions<S: StateKey, E: EventKey, Env>(
    model: &MachineModel<S, E, Env>,
    config: &Configuration<S, E>,
    entered: &[S],
) -> Vec<Completion<S>> {
    let mut raised = Vec::new();

    for state in entered {
        let Some(def) = model.state(state) else {
            continue;
        };

        let completion = if def.is_final() {
            match &def.parent.owner {
                None => Some(Completion::Machine),
                Some(owner) if is_complete(model, config, owner) => {
                    Some(Completion::State(owner.clone()))
                }
                Some(_) => None,
            }
        } else if def.is_leaf() && model.has_completion_transitions(state) {
            Some(Completion::State(state.clone()))
        } else {
            None
        };

        if let Some(completion) = completion {
            if !raised.contains(&completion) {
                raised.push(completion);
            }
        }
    }

    raised
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Region, StateDef, StateKind, Transition, TransitionKind, Trigger};
    use std::collections::{HashMap, HashSet};

    fn def(key: &str, kind: StateKind, parent: RegionId<String>, regions: usize) -> (String, StateDef<String, String, ()>) {
        (
            key.to_string(),
            StateDef {
                key: key.to_string(),
                kind,
                parent,
                regions: (0..regions).map(|i| Region::new(format!("r{i}"))).collect(),
                entry: Vec::new(),
                exit: Vec::new(),
                deferred: HashSet::new(),
            },
        )
    }

    // Root: A, P(r0 {X1, XF(final)}, r1 {Y1, YF(final)}), F(final)
    fn model() -> MachineModel<String, String, ()> {
        let p = || "P".to_string();
        let states = [
            def("A", StateKind::Simple, RegionId::root(), 0),
            def("F", StateKind::Final, RegionId::root(), 0),
            def("P", StateKind::Orthogonal, RegionId::root(), 2),
            def("X1", StateKind::Simple, RegionId::of(p(), 0), 0),
            def("XF", StateKind::Final, RegionId::of(p(), 0), 0),
            def("Y1", StateKind::Simple, RegionId::of(p(), 1), 0),
            def("YF", StateKind::Final, RegionId::of(p(), 1), 0),
        ]
        .into_iter()
        .collect();
        let transitions = vec![Transition {
            name: None,
            source: "A".to_string(),
            target: Some("P".to_string()),
            trigger: Trigger::Completion,
            guard: None,
            actions: Vec::new(),
            kind: TransitionKind::External,
        }];
        MachineModel::from_parts(Region::new("root"), states, HashMap::new(), transitions)
    }

    fn active(pairs: &[(RegionId<String>, &str)]) -> Configuration<String, String> {
        let mut config = Configuration::new(None);
        for (region, state) in pairs {
            config.active.insert(region.clone(), state.to_string());
        }
        config
    }

    #[test]
    fn exit_is_innermost_first_and_records_history() {
        let m = model();
        let p = || "P".to_string();
        let mut config = active(&[
            (RegionId::root(), "P"),
            (RegionId::of(p(), 0), "X1"),
            (RegionId::of(p(), 1), "Y1"),
        ]);
        config.joins.insert("J".to_string(), vec!["X1".to_string()]);

        let exited = exit_region(&m, &mut config, &RegionId::root());

        assert_eq!(exited, vec!["Y1", "X1", "P"]);
        assert!(config.active.is_empty());
        assert!(config.joins.is_empty());

        let root = config.memory(&RegionId::root()).unwrap();
        assert_eq!(root.direct, "P");
        assert_eq!(root.leaves, vec!["X1", "Y1"]);
        assert_eq!(config.memory(&RegionId::of(p(), 1)).unwrap().direct, "Y1");
    }

    #[test]
    fn exiting_empty_region_is_noop() {
        let m = model();
        let mut config = active(&[]);

        assert!(exit_region(&m, &mut config, &RegionId::root()).is_empty());
        assert!(config.history.is_empty());
    }

    #[test]
    fn composite_completes_when_all_regions_final() {
        let m = model();
        let p = || "P".to_string();
        let partial = active(&[
            (RegionId::root(), "P"),
            (RegionId::of(p(), 0), "XF"),
            (RegionId::of(p(), 1), "Y1"),
        ]);
        let done = active(&[
            (RegionId::root(), "P"),
            (RegionId::of(p(), 0), "XF"),
            (RegionId::of(p(), 1), "YF"),
        ]);

        assert!(!is_complete(&m, &partial, &p()));
        assert!(is_complete(&m, &done, &p()));
        assert!(completions(&m, &partial, &["XF".to_string()]).is_empty());
        assert_eq!(
            completions(&m, &done, &["YF".to_string()]),
            vec![Completion::State(p())]
        );
    }

    #[test]
    fn simple_state_with_completion_transition_completes_on_entry() {
        let m = model();
        let config = active(&[(RegionId::root(), "A")]);

        assert_eq!(
            completions(&m, &config, &["A".to_string()]),
            vec![Completion::State("A".to_string())]
        );
    }

    #[test]
    fn top_level_final_completes_machine() {
        let m = model();
        let mut config = active(&[]);
        enter_state(&m, &mut config, &"F".to_string());

        assert_eq!(completions(&m, &config, &["F".to_string()]), vec![Completion::Machine]);
    }
}
