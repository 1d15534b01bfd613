//! Pseudostate resolution.
//!
//! A triggered transition names a target vertex. When that vertex is a
//! pseudostate the chain is walked until only concrete states remain, a join
//! parks, or an end pseudostate terminates the machine. The walk is
//! iterative and bounded by the configured resolution depth.

use super::configuration::Configuration;
use super::error::EngineError;
use super::regions::enter_state;
use crate::core::{
    Action, Branch, EventKey, HistoryDepth, MachineModel, PseudoState, RegionId, Stage,
    StateContext, StateKey, Vertex,
};
use crate::effects::{Invoker, Verdict};

/// Where a resolved chain ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Outcome<S> {
    /// Concrete targets, plus join sources the transition also leaves
    Targets { targets: Vec<S>, anchors: Vec<S> },
    /// A join recorded the arrival but still waits on other sources
    Parked { join: S },
    /// An end pseudostate was reached
    Terminate,
}

pub(crate) struct Resolution<S: StateKey, E: EventKey, Env> {
    pub outcome: Outcome<S>,
    /// Branch and initial actions met along the chain, in walk order
    pub actions: Vec<Action<S, E, Env>>,
    /// Guard failures; each failing guard counted as false
    pub errors: Vec<EngineError<S>>,
}

/// One step of entering a region.
pub(crate) enum EntryStep<S: StateKey, E: EventKey, Env> {
    Enter(S),
    /// Actions of a region's initial transition; `owner` is the region owner
    Initial {
        owner: Option<S>,
        actions: Vec<Action<S, E, Env>>,
    },
}

pub(crate) struct EntryPlan<S: StateKey, E: EventKey, Env> {
    pub steps: Vec<EntryStep<S, E, Env>>,
    pub errors: Vec<EngineError<S>>,
}

pub(crate) struct Resolver<'a, S: StateKey, E: EventKey, Env> {
    model: &'a MachineModel<S, E, Env>,
    invoker: &'a Invoker<Env>,
    max_depth: usize,
}

impl<'a, S, E, Env> Resolver<'a, S, E, Env>
where
    S: StateKey,
    E: EventKey,
    Env: Clone + Send + Sync + 'static,
{
    pub fn new(model: &'a MachineModel<S, E, Env>, invoker: &'a Invoker<Env>, max_depth: usize) -> Self {
        Self {
            model,
            invoker,
            max_depth,
        }
    }

    /// Resolve `start` into concrete targets.
    ///
    /// `source` is the state whose transition is being taken; joins record
    /// it as an arrival. Join arrivals are written to `config`, which must be
    /// the transition's working copy.
    pub async fn resolve(
        &self,
        start: &S,
        source: Option<&S>,
        ctx: &StateContext<S, E>,
        config: &mut Configuration<S, E>,
    ) -> Result<Resolution<S, E, Env>, EngineError<S>> {
        let mut targets: Vec<S> = Vec::new();
        let mut anchors: Vec<S> = Vec::new();
        let mut actions = Vec::new();
        let mut errors = Vec::new();
        let mut parked = None;
        let mut terminate = false;
        let mut visited = 0usize;

        // Each pending vertex carries the pseudostates walked to reach it.
        let mut pending: Vec<(S, Vec<S>)> = vec![(start.clone(), Vec::new())];

        while let Some((vertex, mut trail)) = pending.pop() {
            visited += 1;
            if visited > self.max_depth {
                return Err(EngineError::ResolutionDepthExceeded {
                    limit: self.max_depth,
                });
            }
            if trail.contains(&vertex) {
                return Err(EngineError::ResolutionCycle { vertex });
            }

            let pseudo = match self.model.vertex(&vertex) {
                None => return Err(EngineError::DanglingReference { vertex }),
                Some(Vertex::State(_)) => {
                    if !targets.contains(&vertex) {
                        targets.push(vertex);
                    }
                    continue;
                }
                Some(Vertex::Pseudo(pseudo)) => pseudo,
            };
            trail.push(vertex.clone());

            match pseudo {
                PseudoState::Choice { branches, default }
                | PseudoState::Junction { branches, default } => {
                    let branch = self
                        .select_branch(&vertex, branches, default.as_ref(), ctx, config, &mut errors)
                        .await?;
                    tracing::debug!(vertex = ?vertex, target = ?branch.target, "branch selected");
                    actions.extend(branch.actions.iter().cloned());
                    pending.push((branch.target.clone(), trail));
                }
                PseudoState::Fork { targets: forked } => {
                    for target in forked.iter().rev() {
                        pending.push((target.clone(), trail.clone()));
                    }
                }
                PseudoState::Join { sources, target } => {
                    let arrived = config.joins.entry(vertex.clone()).or_default();
                    if let Some(source) = source {
                        if !arrived.contains(source) {
                            arrived.push(source.clone());
                        }
                    }
                    if sources.iter().all(|s| arrived.contains(s)) {
                        config.joins.remove(&vertex);
                        anchors.extend(sources.iter().cloned());
                        pending.push((target.clone(), trail));
                    } else {
                        parked = Some(vertex);
                    }
                }
                PseudoState::History {
                    depth,
                    region,
                    default,
                } => {
                    if let Some(states) = self.remembered(config, region, *depth) {
                        for state in states {
                            if !targets.contains(&state) {
                                targets.push(state);
                            }
                        }
                    } else if let Some(default) = default {
                        pending.push((default.clone(), trail));
                    } else {
                        let initial = self
                            .model
                            .region(region)
                            .and_then(|r| r.initial.as_ref())
                            .ok_or_else(|| EngineError::MissingInitial {
                                region: region.clone(),
                            })?;
                        actions.extend(initial.actions.iter().cloned());
                        pending.push((initial.target.clone(), trail));
                    }
                }
                PseudoState::End => terminate = true,
                PseudoState::EntryPoint { target } | PseudoState::ExitPoint { target } => {
                    pending.push((target.clone(), trail));
                }
            }
        }

        let outcome = if terminate {
            Outcome::Terminate
        } else if !targets.is_empty() {
            Outcome::Targets { targets, anchors }
        } else if let Some(join) = parked {
            Outcome::Parked { join }
        } else {
            return Err(EngineError::DanglingReference {
                vertex: start.clone(),
            });
        };

        Ok(Resolution {
            outcome,
            actions,
            errors,
        })
    }

    /// First branch whose guard holds, else the default.
    async fn select_branch<'b>(
        &self,
        vertex: &S,
        branches: &'b [Branch<S, E, Env>],
        default: Option<&'b Branch<S, E, Env>>,
        ctx: &StateContext<S, E>,
        config: &Configuration<S, E>,
        errors: &mut Vec<EngineError<S>>,
    ) -> Result<&'b Branch<S, E, Env>, EngineError<S>> {
        let view = ctx.at(Stage::Guard, None, &config.variables);

        for branch in branches {
            match self.invoker.evaluate_guard(branch.guard.as_ref(), &view).await {
                Verdict::Allowed => return Ok(branch),
                Verdict::Denied => {}
                Verdict::Failed(error) => errors.push(EngineError::GuardEvaluation {
                    transition: format!("{vertex:?}"),
                    error,
                }),
            }
        }

        default.ok_or_else(|| EngineError::UnresolvedChoice {
            vertex: vertex.clone(),
        })
    }

    /// Content a history pseudostate restores.
    ///
    /// A region that is still active is about to be exited by the same
    /// transition, so its current content is what the exit will record.
    fn remembered(
        &self,
        config: &Configuration<S, E>,
        region: &RegionId<S>,
        depth: HistoryDepth,
    ) -> Option<Vec<S>> {
        if let Some(direct) = config.active_in(region) {
            return Some(match depth {
                HistoryDepth::Shallow => vec![direct.clone()],
                HistoryDepth::Deep => config.active_leaves(self.model, region),
            });
        }

        config.memory(region).map(|memory| match depth {
            HistoryDepth::Shallow => vec![memory.direct.clone()],
            HistoryDepth::Deep => memory.leaves.clone(),
        })
    }

    /// Plan entering `region` so that every state in `targets` ends up
    /// active. Regions without targets are entered through their initial
    /// transition. The working `config` is updated as states are entered.
    pub async fn plan_entry(
        &self,
        region: RegionId<S>,
        targets: Vec<S>,
        ctx: &StateContext<S, E>,
        config: &mut Configuration<S, E>,
    ) -> Result<EntryPlan<S, E, Env>, EngineError<S>> {
        let mut steps = Vec::new();
        let mut errors = Vec::new();
        let mut stack = vec![(region, targets)];

        while let Some((region, targets)) = stack.pop() {
            if targets.is_empty() {
                let initial = self
                    .model
                    .region(&region)
                    .and_then(|r| r.initial.as_ref())
                    .ok_or_else(|| EngineError::MissingInitial {
                        region: region.clone(),
                    })?;
                let resolution = self.resolve(&initial.target, None, ctx, config).await?;
                errors.extend(resolution.errors);

                let mut actions = initial.actions.clone();
                actions.extend(resolution.actions);
                if !actions.is_empty() {
                    steps.push(EntryStep::Initial {
                        owner: region.owner.clone(),
                        actions,
                    });
                }

                match resolution.outcome {
                    Outcome::Targets { targets, .. } => stack.push((region, targets)),
                    _ => return Err(EngineError::MissingInitial { region }),
                }
                continue;
            }

            let mut child: Option<S> = None;
            for target in &targets {
                match self.model.child_in_region(&region, target) {
                    Some(c) if child.as_ref().map_or(true, |current| current == &c) => {
                        child = Some(c);
                    }
                    _ => return Err(EngineError::RegionConflict { region, targets }),
                }
            }
            let Some(child) = child else {
                return Err(EngineError::RegionConflict { region, targets });
            };

            enter_state(self.model, config, &child);
            steps.push(EntryStep::Enter(child.clone()));

            if let Some(def) = self.model.state(&child) {
                let subregions: Vec<_> = def.region_ids().collect();
                for sub in subregions.into_iter().rev() {
                    let inner: Vec<S> = targets
                        .iter()
                        .filter(|t| self.model.region_contains(&sub, t))
                        .cloned()
                        .collect();
                    stack.push((sub, inner));
                }
            }
        }

        Ok(EntryPlan { steps, errors })
    }
}
