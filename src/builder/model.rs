//! Builder for the machine model.

use super::error::BuildError;
use super::pseudostate::{BranchBuilder, HistoryBuilder};
use super::state::StateBuilder;
use super::transition::TransitionBuilder;
use crate::core::{
    Action, EventKey, Initial, MachineModel, PseudoState, Region, RegionId, StateDef, StateKey, StateKind,
    Transition,
};
use std::collections::{HashMap, HashSet};

const ROOT_REGION: &str = "root";

enum PseudoSpec<S: StateKey, E: EventKey, Env> {
    Ready(PseudoState<S, E, Env>),
    History(HistoryBuilder<S>),
}

struct InitialSpec<S: StateKey, E: EventKey, Env> {
    owner: Option<S>,
    region: String,
    target: S,
    actions: Vec<Action<S, E, Env>>,
}

/// Assembles states, pseudostates and transitions into a validated
/// [`MachineModel`].
///
/// Declaration order matters: regions of a state are numbered in the order
/// their first member is declared, and transitions leaving the same state
/// are tried in the order they were added.
///
/// # Example
///
/// ```rust
/// use statecraft::builder::{BranchBuilder, ModelBuilder, StateBuilder, TransitionBuilder};
///
/// let model = ModelBuilder::<String, String, ()>::new()
///     .state(StateBuilder::new("Idle".to_string()).initial())
///     .state(StateBuilder::new("Small".to_string()))
///     .state(StateBuilder::new("Large".to_string()))
///     .choice(
///         "size".to_string(),
///         BranchBuilder::new()
///             .when(|ctx| ctx.variable("big").is_some(), "Large".to_string())
///             .otherwise("Small".to_string()),
///     )
///     .transition(
///         TransitionBuilder::new()
///             .from("Idle".to_string())
///             .to("size".to_string())
///             .on("measure".to_string()),
///     )
///     .build()
///     .unwrap();
///
/// assert_eq!(model.states().count(), 3);
/// ```
pub struct ModelBuilder<S: StateKey, E: EventKey, Env> {
    states: Vec<StateBuilder<S, E, Env>>,
    pseudostates: Vec<(S, PseudoSpec<S, E, Env>)>,
    transitions: Vec<TransitionBuilder<S, E, Env>>,
    initials: Vec<InitialSpec<S, E, Env>>,
}

impl<S, E, Env> ModelBuilder<S, E, Env>
where
    S: StateKey,
    E: EventKey,
    Env: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            pseudostates: Vec::new(),
            transitions: Vec::new(),
            initials: Vec::new(),
        }
    }

    pub fn state(mut self, state: StateBuilder<S, E, Env>) -> Self {
        self.states.push(state);
        self
    }

    pub fn transition(mut self, transition: TransitionBuilder<S, E, Env>) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Add multiple transitions at once.
    pub fn transitions(mut self, transitions: impl IntoIterator<Item = TransitionBuilder<S, E, Env>>) -> Self {
        self.transitions.extend(transitions);
        self
    }

    /// Initial transition of the top-level region.
    ///
    /// Use this when the machine starts in a pseudostate, for example a
    /// choice; otherwise mark a top-level state with
    /// [`StateBuilder::initial`].
    pub fn initial(self, target: S) -> Self {
        self.push_initial(None, ROOT_REGION.to_string(), target, Vec::new())
    }

    /// Initial transition of the named region of `owner`.
    pub fn region_initial(self, owner: S, region: impl Into<String>, target: S) -> Self {
        self.push_initial(Some(owner), region.into(), target, Vec::new())
    }

    /// Initial transition of the named region of `owner`, with actions.
    pub fn region_initial_with(
        self,
        owner: S,
        region: impl Into<String>,
        target: S,
        actions: Vec<Action<S, E, Env>>,
    ) -> Self {
        self.push_initial(Some(owner), region.into(), target, actions)
    }

    fn push_initial(mut self, owner: Option<S>, region: String, target: S, actions: Vec<Action<S, E, Env>>) -> Self {
        self.initials.push(InitialSpec {
            owner,
            region,
            target,
            actions,
        });
        self
    }

    /// Dynamic conditional branch; guards see the effects of actions
    /// already run on the way in.
    pub fn choice(self, key: S, branches: BranchBuilder<S, E, Env>) -> Self {
        self.pseudo(
            key,
            PseudoState::Choice {
                branches: branches.branches,
                default: branches.default,
            },
        )
    }

    /// Static conditional branch.
    pub fn junction(self, key: S, branches: BranchBuilder<S, E, Env>) -> Self {
        self.pseudo(
            key,
            PseudoState::Junction {
                branches: branches.branches,
                default: branches.default,
            },
        )
    }

    pub fn fork(self, key: S, targets: impl IntoIterator<Item = S>) -> Self {
        self.pseudo(
            key,
            PseudoState::Fork {
                targets: targets.into_iter().collect(),
            },
        )
    }

    pub fn join(self, key: S, sources: impl IntoIterator<Item = S>, target: S) -> Self {
        self.pseudo(
            key,
            PseudoState::Join {
                sources: sources.into_iter().collect(),
                target,
            },
        )
    }

    pub fn history(mut self, key: S, history: HistoryBuilder<S>) -> Self {
        self.pseudostates.push((key, PseudoSpec::History(history)));
        self
    }

    /// Terminates the machine when reached.
    pub fn end(self, key: S) -> Self {
        self.pseudo(key, PseudoState::End)
    }

    pub fn entry_point(self, key: S, target: S) -> Self {
        self.pseudo(key, PseudoState::EntryPoint { target })
    }

    pub fn exit_point(self, key: S, target: S) -> Self {
        self.pseudo(key, PseudoState::ExitPoint { target })
    }

    fn pseudo(mut self, key: S, pseudo: PseudoState<S, E, Env>) -> Self {
        self.pseudostates.push((key, PseudoSpec::Ready(pseudo)));
        self
    }

    /// Validate the declarations and build the model.
    pub fn build(self) -> Result<MachineModel<S, E, Env>, BuildError> {
        let Self {
            states: builders,
            pseudostates: pseudo_specs,
            transitions: transition_builders,
            initials: explicit_initials,
        } = self;

        let mut vertices: HashSet<S> = HashSet::new();
        for key in builders
            .iter()
            .map(|b| &b.key)
            .chain(pseudo_specs.iter().map(|(key, _)| key))
        {
            if !vertices.insert(key.clone()) {
                return Err(BuildError::DuplicateVertex(format!("{key:?}")));
            }
        }

        let state_keys: HashSet<&S> = builders.iter().map(|b| &b.key).collect();
        let mut parents: HashMap<S, S> = HashMap::new();
        for builder in &builders {
            if let Some((parent, _)) = &builder.parent {
                if !state_keys.contains(parent) {
                    return Err(BuildError::UnknownParent {
                        state: format!("{:?}", builder.key),
                        parent: format!("{parent:?}"),
                    });
                }
                parents.insert(builder.key.clone(), parent.clone());
            }
        }
        check_acyclic(&parents)?;

        let mut layout: HashMap<S, Vec<String>> = HashMap::new();
        for builder in &builders {
            if let Some((owner, name)) = &builder.parent {
                let names = layout.entry(owner.clone()).or_default();
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }

        let mut initials: Vec<(RegionId<S>, S, Vec<Action<S, E, Env>>)> = Vec::new();
        for spec in explicit_initials {
            let region = locate(&layout, spec.owner.as_ref(), &spec.region)?;
            initials.push((region, spec.target, spec.actions));
        }

        let mut root = Region::new(ROOT_REGION);
        let mut states: HashMap<S, StateDef<S, E, Env>> = HashMap::new();
        let mut members: Vec<(S, RegionId<S>)> = Vec::new();

        for builder in builders {
            let regions: Vec<Region<S, E, Env>> = layout
                .get(&builder.key)
                .map(|names| names.iter().map(|name| Region::new(name.clone())).collect())
                .unwrap_or_default();

            let kind = match (builder.is_final, regions.len()) {
                (true, 0) => StateKind::Final,
                (true, _) => return Err(BuildError::InvalidFinal(format!("{:?}", builder.key))),
                (false, 0) => StateKind::Simple,
                (false, 1) => StateKind::Composite,
                (false, _) => StateKind::Orthogonal,
            };

            let parent = match &builder.parent {
                None => RegionId::root(),
                Some((owner, name)) => locate(&layout, Some(owner), name)?,
            };

            if builder.initial {
                initials.push((parent.clone(), builder.key.clone(), builder.initial_actions));
            }
            members.push((builder.key.clone(), parent.clone()));

            states.insert(
                builder.key.clone(),
                StateDef {
                    key: builder.key,
                    kind,
                    parent,
                    regions,
                    entry: builder.entry,
                    exit: builder.exit,
                    deferred: builder.deferred,
                },
            );
        }

        for (key, parent) in members {
            if let Some(region) = region_mut(&mut root, &mut states, &parent) {
                region.states.push(key);
            }
        }

        for (id, target, actions) in initials {
            if !vertices.contains(&target) {
                return Err(BuildError::InvalidTransition(format!(
                    "initial transition of {} targets unknown vertex {target:?}",
                    describe(&id)
                )));
            }
            let Some(region) = region_mut(&mut root, &mut states, &id) else {
                return Err(BuildError::UnknownRegion {
                    owner: format!("{:?}", id.owner),
                    region: id.index.to_string(),
                });
            };
            if region.initial.is_some() {
                return Err(BuildError::MultipleInitials(describe(&id)));
            }
            region.initial = Some(Initial { target, actions });
        }

        if root.initial.is_none() {
            return Err(BuildError::MissingInitialState);
        }
        for def in states.values() {
            for (index, region) in def.regions.iter().enumerate() {
                if region.initial.is_none() {
                    tracing::warn!(
                        owner = ?def.key,
                        region = %region.name,
                        index,
                        "region has no initial transition; it can only be entered explicitly"
                    );
                }
            }
        }

        let mut pseudostates: HashMap<S, PseudoState<S, E, Env>> = HashMap::new();
        for (key, spec) in pseudo_specs {
            let pseudo = match spec {
                PseudoSpec::Ready(pseudo) => pseudo,
                PseudoSpec::History(history) => PseudoState::History {
                    depth: history.depth,
                    region: locate(&layout, history.owner.as_ref(), &history.region)?,
                    default: history.default,
                },
            };
            pseudostates.insert(key, pseudo);
        }

        for (key, pseudo) in &pseudostates {
            for referenced in pseudo.referenced() {
                if !vertices.contains(referenced) {
                    return Err(BuildError::InvalidTransition(format!(
                        "{key:?} routes to unknown vertex {referenced:?}"
                    )));
                }
            }
            match pseudo {
                PseudoState::Join { sources, .. } => {
                    if let Some(source) = sources.iter().find(|s| !states.contains_key(*s)) {
                        return Err(BuildError::InvalidTransition(format!(
                            "join {key:?} lists {source:?}, which is not a state"
                        )));
                    }
                }
                PseudoState::Choice { default: None, .. } | PseudoState::Junction { default: None, .. } => {
                    tracing::warn!(vertex = ?key, "branch pseudostate has no default branch");
                }
                _ => {}
            }
        }

        let transitions = transition_builders
            .into_iter()
            .map(TransitionBuilder::build)
            .collect::<Result<Vec<_>, _>>()?;
        validate_transitions(&transitions, &states, &pseudostates, &vertices)?;

        tracing::debug!(
            states = states.len(),
            pseudostates = pseudostates.len(),
            transitions = transitions.len(),
            "machine model built"
        );

        Ok(MachineModel::from_parts(root, states, pseudostates, transitions))
    }
}

impl<S, E, Env> Default for ModelBuilder<S, E, Env>
where
    S: StateKey,
    E: EventKey,
    Env: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn validate_transitions<S: StateKey, E: EventKey, Env>(
    transitions: &[Transition<S, E, Env>],
    states: &HashMap<S, StateDef<S, E, Env>>,
    pseudostates: &HashMap<S, PseudoState<S, E, Env>>,
    vertices: &HashSet<S>,
) -> Result<(), BuildError> {
    for transition in transitions {
        if !states.contains_key(&transition.source) {
            return Err(BuildError::InvalidTransition(format!(
                "{} leaves {:?}, which is not a state",
                transition.label(),
                transition.source
            )));
        }

        let Some(target) = &transition.target else {
            continue;
        };
        if !vertices.contains(target) {
            return Err(BuildError::InvalidTransition(format!(
                "{} targets unknown vertex {target:?}",
                transition.label()
            )));
        }

        let Some(PseudoState::Join { sources, .. }) = pseudostates.get(target) else {
            continue;
        };
        if !sources.contains(&transition.source) {
            return Err(BuildError::InvalidTransition(format!(
                "{} enters join {target:?} from {:?}, which is not one of its sources",
                transition.label(),
                transition.source
            )));
        }

        let overlapping = transitions.iter().any(|other| {
            other.source == transition.source
                && other.trigger == transition.trigger
                && !matches!(
                    other.target.as_ref().and_then(|t| pseudostates.get(t)),
                    Some(PseudoState::Join { .. })
                )
        });
        if overlapping {
            tracing::warn!(
                transition = %transition.label(),
                join = ?target,
                "join arrival and an ordinary transition from the same source both fire on this trigger"
            );
        }
    }
    Ok(())
}

fn check_acyclic<S: StateKey>(parents: &HashMap<S, S>) -> Result<(), BuildError> {
    for start in parents.keys() {
        let mut current = start;
        let mut steps = 0;
        while let Some(parent) = parents.get(current) {
            steps += 1;
            if parent == start || steps > parents.len() {
                return Err(BuildError::CyclicHierarchy(format!("{start:?}")));
            }
            current = parent;
        }
    }
    Ok(())
}

fn locate<S: StateKey>(
    layout: &HashMap<S, Vec<String>>,
    owner: Option<&S>,
    region: &str,
) -> Result<RegionId<S>, BuildError> {
    let Some(owner) = owner else {
        return Ok(RegionId::root());
    };
    layout
        .get(owner)
        .and_then(|names| names.iter().position(|name| name == region))
        .map(|index| RegionId::of(owner.clone(), index))
        .ok_or_else(|| BuildError::UnknownRegion {
            owner: format!("{owner:?}"),
            region: region.to_string(),
        })
}

fn region_mut<'a, S: StateKey, E: EventKey, Env>(
    root: &'a mut Region<S, E, Env>,
    states: &'a mut HashMap<S, StateDef<S, E, Env>>,
    id: &RegionId<S>,
) -> Option<&'a mut Region<S, E, Env>> {
    match &id.owner {
        None => Some(root),
        Some(owner) => states.get_mut(owner)?.regions.get_mut(id.index),
    }
}

fn describe<S: StateKey>(id: &RegionId<S>) -> String {
    match &id.owner {
        None => ROOT_REGION.to_string(),
        Some(owner) => format!("{owner:?}[{}]", id.index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{HistoryDepth, TransitionKind};

    type Builder = ModelBuilder<String, String, ()>;

    fn s(key: &str) -> String {
        key.to_string()
    }

    fn state(key: &str) -> StateBuilder<String, String, ()> {
        StateBuilder::new(s(key))
    }

    fn on(from: &str, to: &str, event: &str) -> TransitionBuilder<String, String, ()> {
        TransitionBuilder::new().from(s(from)).to(s(to)).on(s(event))
    }

    #[test]
    fn builds_simple_machine() {
        let model = Builder::new()
            .state(state("Idle").initial())
            .state(state("Running"))
            .transition(on("Idle", "Running", "go"))
            .build()
            .unwrap();

        assert_eq!(model.root().states, vec![s("Idle"), s("Running")]);
        assert_eq!(model.root().initial.as_ref().map(|i| &i.target), Some(&s("Idle")));
        assert_eq!(model.outgoing(&s("Idle")), &[0]);
        assert_eq!(model.state(&s("Running")).map(|d| d.kind), Some(StateKind::Simple));
    }

    #[test]
    fn requires_top_level_initial() {
        let result = Builder::new().state(state("Idle")).build();

        assert!(matches!(result, Err(BuildError::MissingInitialState)));
    }

    #[test]
    fn explicit_initial_can_target_pseudostate() {
        let model = Builder::new()
            .state(state("A"))
            .state(state("B"))
            .choice(s("start"), BranchBuilder::new().otherwise(s("B")))
            .initial(s("start"))
            .build()
            .unwrap();

        assert_eq!(model.root().initial.as_ref().map(|i| &i.target), Some(&s("start")));
    }

    #[test]
    fn rejects_duplicate_vertices() {
        let result = Builder::new()
            .state(state("A").initial())
            .end(s("A"))
            .build();

        assert!(matches!(result, Err(BuildError::DuplicateVertex(_))));
    }

    #[test]
    fn rejects_unknown_parent_and_cycles() {
        let unknown = Builder::new()
            .state(state("A").initial())
            .state(state("X").child_of(s("Missing")))
            .build();
        let cyclic = Builder::new()
            .state(state("A").initial())
            .state(state("P").child_of(s("Q")))
            .state(state("Q").child_of(s("P")))
            .build();

        assert!(matches!(unknown, Err(BuildError::UnknownParent { .. })));
        assert!(matches!(cyclic, Err(BuildError::CyclicHierarchy(_))));
    }

    #[test]
    fn rejects_two_initials_in_one_region() {
        let result = Builder::new()
            .state(state("A").initial())
            .state(state("B").initial())
            .build();

        assert!(matches!(result, Err(BuildError::MultipleInitials(_))));
    }

    #[test]
    fn derives_kinds_and_region_order() {
        let model = Builder::new()
            .state(state("P").initial())
            .state(state("X1").in_region(s("P"), "left").initial())
            .state(state("Y1").in_region(s("P"), "right").initial())
            .state(state("X2").in_region(s("P"), "left"))
            .state(state("C").child_of(s("X2")).initial())
            .state(state("Done").final_state())
            .build()
            .unwrap();

        let p = model.state(&s("P")).unwrap();
        assert_eq!(p.kind, StateKind::Orthogonal);
        assert_eq!(p.regions[0].name, "left");
        assert_eq!(p.regions[0].states, vec![s("X1"), s("X2")]);
        assert_eq!(p.regions[1].states, vec![s("Y1")]);
        assert_eq!(model.state(&s("Y1")).unwrap().parent, RegionId::of(s("P"), 1));
        assert_eq!(model.state(&s("X2")).unwrap().kind, StateKind::Composite);
        assert_eq!(model.state(&s("Done")).unwrap().kind, StateKind::Final);
    }

    #[test]
    fn final_states_cannot_own_regions() {
        let result = Builder::new()
            .state(state("Done").final_state().initial())
            .state(state("Inner").child_of(s("Done")).initial())
            .build();

        assert!(matches!(result, Err(BuildError::InvalidFinal(_))));
    }

    #[test]
    fn history_resolves_named_region() {
        let model = Builder::new()
            .state(state("P").initial())
            .state(state("A").in_region(s("P"), "main").initial())
            .history(
                s("H"),
                HistoryBuilder::shallow(s("P")).in_region("main").default_to(s("A")),
            )
            .build()
            .unwrap();

        match model.pseudostate(&s("H")) {
            Some(PseudoState::History { depth, region, default }) => {
                assert_eq!(*depth, HistoryDepth::Shallow);
                assert_eq!(region, &RegionId::of(s("P"), 0));
                assert_eq!(default.as_deref(), Some("A"));
            }
            _ => panic!("expected history pseudostate"),
        }

        let missing = Builder::new()
            .state(state("P").initial())
            .history(s("H"), HistoryBuilder::shallow(s("P")))
            .build();
        assert!(matches!(missing, Err(BuildError::UnknownRegion { .. })));
    }

    #[test]
    fn rejects_unknown_transition_endpoints() {
        let target = Builder::new()
            .state(state("A").initial())
            .transition(on("A", "Nowhere", "go"))
            .build();
        let source = Builder::new()
            .state(state("A").initial())
            .end(s("stop"))
            .transition(on("stop", "A", "go"))
            .build();

        assert!(matches!(target, Err(BuildError::InvalidTransition(_))));
        assert!(matches!(source, Err(BuildError::InvalidTransition(_))));
    }

    #[test]
    fn join_arrivals_must_come_from_sources() {
        let result = Builder::new()
            .state(state("A").initial())
            .state(state("B"))
            .state(state("C"))
            .join(s("meet"), vec![s("A"), s("B")], s("C"))
            .transition(on("C", "meet", "go"))
            .build();

        assert!(matches!(result, Err(BuildError::InvalidTransition(_))));
    }

    #[test]
    fn transition_errors_surface_from_build() {
        let result = Builder::new()
            .state(state("A").initial())
            .transition(TransitionBuilder::new().from(s("A")).on(s("go")))
            .build();

        assert!(matches!(result, Err(BuildError::MissingToState)));
    }

    #[test]
    fn internal_and_local_kinds_are_kept() {
        let model = Builder::new()
            .state(state("P").initial())
            .state(state("A").child_of(s("P")).initial())
            .transitions(vec![
                TransitionBuilder::new().from(s("P")).on(s("poke")).internal(),
                on("P", "A", "reset").local(),
            ])
            .build()
            .unwrap();

        let kinds: Vec<_> = model.transitions().iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TransitionKind::Internal, TransitionKind::Local]);
    }
}
