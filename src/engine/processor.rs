//! Event processor: the run-to-completion step.
//!
//! One signal (event, completion or timer tick) is processed at a time.
//! Every processing step selects the enabled transitions for the current
//! configuration, fires them one after another and then settles: pending
//! completions are consumed and, after a state change, deferred events are
//! replayed in arrival order. Nothing else runs until the step settles.

use super::configuration::Configuration;
use super::deferred::DeferredEvent;
use super::error::EngineError;
use super::notify::{Notification, Notifier};
use super::regions::{completions, exit_region, Completion};
use super::resolver::{EntryStep, Outcome, Resolver};
use super::timer::Timers;
use super::machine::Command;
use crate::checkpoint::{CheckpointError, Snapshot, StatePersister};
use crate::config::EngineConfig;
use crate::core::{
    Cause, EventKey, MachineModel, RegionId, Stage, StateContext, StateKey, Transition,
    TransitionJournal, TransitionKind, TransitionRecord,
};
use crate::effects::{failures, ActionFailure, Invoker, Verdict};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// How an event was handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventStatus {
    /// At least one transition committed
    Accepted,
    /// No transition was enabled and an active state defers the event
    Deferred,
    /// No transition was enabled; the event was dropped
    NotAccepted,
    /// The event only recorded a join arrival
    Parked,
    /// Every selected transition aborted
    Failed,
    /// The machine stopped before processing the event
    Rejected,
}

/// Result of processing one submitted event.
#[derive(Clone, Debug, PartialEq)]
pub struct EventOutcome<S: StateKey> {
    pub status: EventStatus,
    pub errors: Vec<EngineError<S>>,
}

impl<S: StateKey> EventOutcome<S> {
    pub fn new(status: EventStatus) -> Self {
        Self {
            status,
            errors: Vec::new(),
        }
    }

    pub fn rejected() -> Self {
        Self {
            status: EventStatus::Rejected,
            errors: vec![EngineError::MachineDisabled],
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == EventStatus::Accepted
    }

    fn with_errors(mut self, errors: Vec<EngineError<S>>) -> Self {
        self.errors.extend(errors);
        self
    }
}

/// A join with partial arrivals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingJoin<S> {
    pub join: S,
    pub arrived: Vec<S>,
    pub missing: Vec<S>,
}

pub(crate) enum Signal<S, E> {
    Event { event: E, payload: Option<Value> },
    Completion(S),
    Timer { transition: usize, epoch: u64 },
}

pub(crate) struct Processor<S: StateKey, E: EventKey, Env> {
    model: Arc<MachineModel<S, E, Env>>,
    invoker: Arc<Invoker<Env>>,
    settings: EngineConfig,
    config: Configuration<S, E>,
    journal: TransitionJournal<S, E>,
    notifier: Notifier<S, E>,
    persister: Option<Arc<dyn StatePersister<S, E>>>,
    timers: Timers<S, E>,
    completions: VecDeque<S>,
    replay_pending: bool,
    finished: bool,
}

impl<S, E, Env> Processor<S, E, Env>
where
    S: StateKey,
    E: EventKey,
    Env: Clone + Send + Sync + 'static,
{
    pub fn new(
        model: Arc<MachineModel<S, E, Env>>,
        env: Env,
        settings: EngineConfig,
        notifier: Notifier<S, E>,
        persister: Option<Arc<dyn StatePersister<S, E>>>,
    ) -> Self {
        Self {
            model,
            invoker: Arc::new(Invoker::new(env)),
            config: Configuration::new(settings.deferred_capacity),
            journal: TransitionJournal::new(settings.journal_capacity),
            settings,
            notifier,
            persister,
            timers: Timers::new(),
            completions: VecDeque::new(),
            replay_pending: false,
            finished: false,
        }
    }

    pub fn attach_timers(&mut self, sender: UnboundedSender<Command<S, E>>) {
        self.timers.attach(sender);
    }

    /// Run the initial transition chain of the top-level region.
    pub async fn start(&mut self) -> Result<Vec<EngineError<S>>, EngineError<S>> {
        let model = Arc::clone(&self.model);
        let invoker = Arc::clone(&self.invoker);
        let resolver = Resolver::new(&model, &invoker, self.settings.max_resolution_depth);

        let mut working = self.config.clone();
        let ctx = StateContext::new(Stage::Initial, working.variables.clone());
        let plan = resolver
            .plan_entry(RegionId::root(), Vec::new(), &ctx, &mut working)
            .await?;

        self.notifier.emit(Notification::MachineStarted {
            machine: self.settings.machine_id.clone(),
        });

        let mut errors = Vec::new();
        for error in plan.errors {
            self.report(error, &mut errors);
        }
        let mut failed = Vec::new();
        let entered = self.run_entry(&plan.steps, &ctx, &mut working, &mut failed).await;
        self.report_failures(failed, &mut errors);
        self.commit(working, &[], &entered, Cause::Start, None, &mut errors);

        errors.extend(self.settle().await);
        Ok(errors)
    }

    /// Seed the configuration from a snapshot instead of starting.
    pub fn restore(&mut self, snapshot: Snapshot<S, E>) -> Result<(), CheckpointError> {
        snapshot.validate(&self.model)?;
        self.config = snapshot.into_configuration(self.settings.deferred_capacity);

        let model = Arc::clone(&self.model);
        for state in self.config.active_states(&model) {
            for spec in model.timers(&state) {
                self.timers.arm(spec);
            }
        }

        self.notifier.emit(Notification::MachineStarted {
            machine: self.settings.machine_id.clone(),
        });
        tracing::info!(
            machine = %self.settings.machine_id,
            active = ?self.config.active_states(&model),
            "configuration restored"
        );
        Ok(())
    }

    /// Process one signal and settle the machine.
    pub async fn dispatch(&mut self, signal: Signal<S, E>) -> EventOutcome<S> {
        if self.finished {
            return EventOutcome::rejected();
        }
        self.replay_pending = false;
        let outcome = self.step(signal).await;
        let errors = self.settle().await;
        outcome.with_errors(errors)
    }

    /// Stop timers and report joins that never completed.
    pub fn shutdown(&mut self) -> Vec<EngineError<S>> {
        self.timers.cancel_all();

        let leaks: Vec<EngineError<S>> = self
            .pending_joins()
            .into_iter()
            .map(|pending| EngineError::JoinLeak {
                join: pending.join,
                arrived: pending.arrived,
                missing: pending.missing,
            })
            .collect();
        for leak in &leaks {
            self.notifier.emit(Notification::Error(leak.clone()));
        }

        self.notifier.emit(Notification::MachineStopped {
            machine: self.settings.machine_id.clone(),
        });
        leaks
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn active_states(&self) -> Vec<S> {
        self.config.active_states(&self.model)
    }

    pub fn is_active(&self, state: &S) -> bool {
        self.config.is_active(&self.model, state)
    }

    pub fn variable(&self, key: &str) -> Option<Value> {
        self.config.variables.get(key).cloned()
    }

    pub fn deferred_events(&self) -> Vec<DeferredEvent<E>> {
        self.config.deferred.iter().cloned().collect()
    }

    pub fn journal(&self) -> TransitionJournal<S, E> {
        self.journal.clone()
    }

    pub fn snapshot(&self) -> Snapshot<S, E> {
        Snapshot::capture(&self.settings.machine_id, &self.model, &self.config)
    }

    pub fn pending_joins(&self) -> Vec<PendingJoin<S>> {
        let mut pending: Vec<PendingJoin<S>> = self
            .config
            .joins
            .iter()
            .filter(|(_, arrived)| !arrived.is_empty())
            .map(|(join, arrived)| {
                let missing = match self.model.pseudostate(join) {
                    Some(crate::core::PseudoState::Join { sources, .. }) => sources
                        .iter()
                        .filter(|s| !arrived.contains(s))
                        .cloned()
                        .collect(),
                    _ => Vec::new(),
                };
                PendingJoin {
                    join: join.clone(),
                    arrived: arrived.clone(),
                    missing,
                }
            })
            .collect();
        pending.sort_by_key(|p| format!("{:?}", p.join));
        pending
    }

    async fn step(&mut self, signal: Signal<S, E>) -> EventOutcome<S> {
        let model = Arc::clone(&self.model);

        match signal {
            Signal::Event { event, payload } => self.step_event(event, payload, false).await,
            Signal::Completion(state) => {
                if !self.config.is_active(&model, &state) {
                    return EventOutcome::new(EventStatus::NotAccepted);
                }
                let candidates: Vec<usize> = model
                    .outgoing(&state)
                    .iter()
                    .copied()
                    .filter(|&i| model.transitions()[i].trigger.is_completion())
                    .collect();
                tracing::debug!(state = ?state, "completion event");
                self.step_first_enabled(candidates, Cause::Completion(state)).await
            }
            Signal::Timer { transition, epoch } => {
                if !self.timers.is_current(transition, epoch) {
                    tracing::debug!(transition, epoch, "stale timer tick discarded");
                    return EventOutcome::new(EventStatus::NotAccepted);
                }
                self.step_first_enabled(vec![transition], Cause::Timer).await
            }
        }
    }

    /// Process an event. A `replayed` event came out of the deferred queue
    /// and goes back into it when nothing accepts it.
    async fn step_event(&mut self, event: E, payload: Option<Value>, replayed: bool) -> EventOutcome<S> {
        let model = Arc::clone(&self.model);
        let mut errors = Vec::new();
        let chosen = self.select(&event, payload.as_ref(), &mut errors).await;

        if chosen.is_empty() {
            if replayed {
                tracing::debug!(event = ?event, "deferred event kept for a later state");
                self.config.deferred.requeue([DeferredEvent {
                    event: event.clone(),
                    payload,
                }]);
                self.notifier.emit(Notification::EventDeferred(event));
                return EventOutcome::new(EventStatus::Deferred).with_errors(errors);
            }
            if self.config.defers(&model, &event) {
                let deferred = DeferredEvent {
                    event: event.clone(),
                    payload,
                };
                if self.config.deferred.push(deferred) {
                    self.notifier.emit(Notification::EventDeferred(event));
                    return EventOutcome::new(EventStatus::Deferred).with_errors(errors);
                }
                self.report(EngineError::DeferredOverflow, &mut errors);
            }
            self.notifier.emit(Notification::EventNotAccepted(event));
            return EventOutcome::new(EventStatus::NotAccepted).with_errors(errors);
        }

        let cause = Cause::Event(event.clone());
        self.fire_all(chosen, Some(&event), payload.as_ref(), cause, errors).await
    }

    /// Completion and timer signals: the first enabled candidate fires.
    async fn step_first_enabled(&mut self, candidates: Vec<usize>, cause: Cause<S, E>) -> EventOutcome<S> {
        let model = Arc::clone(&self.model);
        let mut errors = Vec::new();

        for index in candidates {
            let Some(transition) = model.transition(index) else {
                continue;
            };
            if !self.config.is_active(&model, &transition.source) {
                continue;
            }
            if self.check_guard(transition, None, None, &mut errors).await {
                return self.fire_all(vec![index], None, None, cause, errors).await;
            }
        }

        EventOutcome::new(EventStatus::NotAccepted).with_errors(errors)
    }

    /// Enabled transitions for `event`.
    ///
    /// Each active leaf contributes the first enabled transition found
    /// walking from the leaf outwards. Enabled join arrivals on the way are
    /// collected separately and never end the walk. A transition whose
    /// source encloses the source of another selected transition is
    /// dropped. Join arrivals fire after the ordinary transitions.
    async fn select(
        &self,
        event: &E,
        payload: Option<&Value>,
        errors: &mut Vec<EngineError<S>>,
    ) -> Vec<usize> {
        let model = &self.model;
        let mut verdicts: HashMap<usize, bool> = HashMap::new();
        let mut chosen: Vec<usize> = Vec::new();
        let mut arrivals: Vec<usize> = Vec::new();

        for leaf in self.config.active_leaves(model, &RegionId::root()) {
            'lineage: for state in model.lineage(&leaf) {
                for &index in model.outgoing(&state) {
                    let transition = &model.transitions()[index];
                    if !transition.trigger.matches_event(event) {
                        continue;
                    }
                    let allowed = match verdicts.get(&index) {
                        Some(&allowed) => allowed,
                        None => {
                            let allowed = self.check_guard(transition, Some(event), payload, errors).await;
                            verdicts.insert(index, allowed);
                            allowed
                        }
                    };
                    if !allowed {
                        continue;
                    }
                    if model.feeds_join(index) {
                        if !arrivals.contains(&index) {
                            arrivals.push(index);
                        }
                        continue;
                    }
                    if !chosen.contains(&index) {
                        chosen.push(index);
                    }
                    break 'lineage;
                }
            }
        }

        chosen.extend(arrivals);
        let sources: Vec<&S> = chosen.iter().map(|&i| &model.transitions()[i].source).collect();
        let selected: Vec<usize> = chosen
            .iter()
            .copied()
            .filter(|&i| {
                let source = &model.transitions()[i].source;
                !sources.iter().any(|other| model.is_descendant(other, source))
            })
            .collect();

        tracing::debug!(event = ?event, transitions = ?selected, "transitions selected");
        selected
    }

    async fn check_guard(
        &self,
        transition: &Transition<S, E, Env>,
        event: Option<&E>,
        payload: Option<&Value>,
        errors: &mut Vec<EngineError<S>>,
    ) -> bool {
        let ctx = StateContext::new(Stage::Guard, self.config.variables.clone())
            .with_event(event.cloned(), payload.cloned())
            .with_transition(
                Some(transition.source.clone()),
                transition.target.clone(),
                transition.name.clone(),
            );

        match self.invoker.evaluate_guard(transition.guard.as_ref(), &ctx).await {
            Verdict::Allowed => true,
            Verdict::Denied => false,
            Verdict::Failed(error) => {
                self.report(
                    EngineError::GuardEvaluation {
                        transition: transition.label(),
                        error,
                    },
                    errors,
                );
                false
            }
        }
    }

    async fn fire_all(
        &mut self,
        chosen: Vec<usize>,
        event: Option<&E>,
        payload: Option<&Value>,
        cause: Cause<S, E>,
        mut errors: Vec<EngineError<S>>,
    ) -> EventOutcome<S> {
        let model = Arc::clone(&self.model);
        let mut statuses = Vec::with_capacity(chosen.len());

        for index in chosen {
            let source = &model.transitions()[index].source;
            if self.finished || !self.config.is_active(&model, source) {
                tracing::debug!(transition = index, "source left by an earlier transition, skipped");
                continue;
            }
            statuses.push(self.fire(index, event, payload, cause.clone(), &mut errors).await);
        }

        let status = if statuses.contains(&EventStatus::Accepted) {
            EventStatus::Accepted
        } else if statuses.contains(&EventStatus::Parked) {
            EventStatus::Parked
        } else if statuses.is_empty() {
            EventStatus::NotAccepted
        } else {
            EventStatus::Failed
        };
        EventOutcome::new(status).with_errors(errors)
    }

    /// Fire one transition as a transaction over a working configuration.
    async fn fire(
        &mut self,
        index: usize,
        event: Option<&E>,
        payload: Option<&Value>,
        cause: Cause<S, E>,
        errors: &mut Vec<EngineError<S>>,
    ) -> EventStatus {
        let model = Arc::clone(&self.model);
        let invoker = Arc::clone(&self.invoker);
        let Some(transition) = model.transition(index) else {
            return EventStatus::Failed;
        };
        let label = transition.label();
        let source = transition.source.clone();

        let ctx = StateContext::new(Stage::Transition, self.config.variables.clone())
            .with_event(event.cloned(), payload.cloned())
            .with_transition(Some(source.clone()), transition.target.clone(), transition.name.clone());
        let mut working = self.config.clone();
        let mut failed = Vec::new();

        let target = match &transition.target {
            Some(target) if !transition.is_internal() => target,
            _ => {
                self.emit_started(transition);
                self.run_transition_actions(transition, &[], &ctx, &mut working, &mut failed)
                    .await;
                self.config = working;
                self.report_failures(failed, errors);
                self.persist(errors);
                self.emit_ended(transition);
                return EventStatus::Accepted;
            }
        };

        let resolver = Resolver::new(&model, &invoker, self.settings.max_resolution_depth);
        let resolution = match resolver.resolve(target, Some(&source), &ctx, &mut working).await {
            Ok(resolution) => resolution,
            Err(error) => {
                self.report(error, errors);
                return EventStatus::Failed;
            }
        };
        for error in resolution.errors {
            self.report(error, errors);
        }

        let (targets, anchors) = match resolution.outcome {
            Outcome::Parked { join } => {
                let arrived = working.arrivals(&join).to_vec();
                self.config = working;
                self.notifier.emit(Notification::JoinParked { join, arrived });
                return EventStatus::Parked;
            }
            Outcome::Terminate => {
                let exited = exit_region(&model, &mut working, &RegionId::root());
                self.emit_started(transition);
                self.run_exits(&exited, &ctx, &mut working, &mut failed).await;
                self.run_transition_actions(transition, &resolution.actions, &ctx, &mut working, &mut failed)
                    .await;
                self.report_failures(failed, errors);
                self.commit(working, &exited, &[], cause, Some(label), errors);
                self.finished = true;
                self.emit_ended(transition);
                tracing::info!(machine = %self.settings.machine_id, "terminate reached");
                return EventStatus::Accepted;
            }
            Outcome::Targets { targets, anchors } => (targets, anchors),
        };
        let ctx = match targets.as_slice() {
            [resolved] => ctx.retarget(resolved.clone()),
            _ => ctx,
        };

        let domains = self.domains(transition, targets, &anchors);
        let mut exited = Vec::new();
        for (region, _) in &domains {
            exited.extend(exit_region(&model, &mut working, region));
        }

        let mut steps = Vec::new();
        for (region, inner) in domains {
            match resolver.plan_entry(region, inner, &ctx, &mut working).await {
                Ok(plan) => {
                    for error in plan.errors {
                        self.report(error, errors);
                    }
                    steps.extend(plan.steps);
                }
                Err(error) => {
                    self.report(error, errors);
                    return EventStatus::Failed;
                }
            }
        }

        self.emit_started(transition);
        self.run_exits(&exited, &ctx, &mut working, &mut failed).await;
        self.run_transition_actions(transition, &resolution.actions, &ctx, &mut working, &mut failed)
            .await;
        let entered = self.run_entry(&steps, &ctx, &mut working, &mut failed).await;
        self.report_failures(failed, errors);
        self.commit(working, &exited, &entered, cause, Some(label), errors);
        self.emit_ended(transition);

        EventStatus::Accepted
    }

    /// Regions a transition exits and re-enters, each with its targets.
    fn domains(
        &self,
        transition: &Transition<S, E, Env>,
        targets: Vec<S>,
        anchors: &[S],
    ) -> Vec<(RegionId<S>, Vec<S>)> {
        let model = &self.model;
        let source = &transition.source;

        // Local transition to an enclosing state: only the region holding
        // the source is left and re-entered through its initial.
        if let (TransitionKind::Local, [target]) = (transition.kind, targets.as_slice()) {
            if model.is_descendant(source, target) {
                if let Some(def) = model.state(target) {
                    return def
                        .region_ids()
                        .filter(|region| model.region_contains(region, source))
                        .map(|region| (region, Vec::new()))
                        .collect();
                }
            }
        }

        if transition.kind == TransitionKind::Local
            && targets.iter().all(|t| model.is_descendant(t, source))
        {
            if let Some(def) = model.state(source) {
                return def
                    .region_ids()
                    .filter_map(|region| {
                        let inner: Vec<S> = targets
                            .iter()
                            .filter(|t| model.region_contains(&region, t))
                            .cloned()
                            .collect();
                        (!inner.is_empty()).then_some((region, inner))
                    })
                    .collect();
            }
        }

        let region = model
            .enclosing_regions(source)
            .into_iter()
            .find(|region| {
                targets
                    .iter()
                    .chain(anchors.iter())
                    .all(|state| model.region_contains(region, state))
            })
            .unwrap_or_else(RegionId::root);
        vec![(region, targets)]
    }

    async fn run_exits(
        &self,
        exited: &[S],
        ctx: &StateContext<S, E>,
        working: &mut Configuration<S, E>,
        failed: &mut Vec<ActionFailure<S>>,
    ) {
        for state in exited {
            if let Some(def) = self.model.state(state) {
                let view = ctx.at(Stage::Exit, Some(state.clone()), &working.variables);
                let result = self
                    .invoker
                    .run_actions(&def.exit, &view, &mut working.variables)
                    .await;
                failed.extend(failures(result));
            }
            self.notifier.emit(Notification::StateExited(state.clone()));
        }
    }

    async fn run_transition_actions(
        &self,
        transition: &Transition<S, E, Env>,
        chained: &[crate::core::Action<S, E, Env>],
        ctx: &StateContext<S, E>,
        working: &mut Configuration<S, E>,
        failed: &mut Vec<ActionFailure<S>>,
    ) {
        let mut actions = transition.actions.clone();
        actions.extend(chained.iter().cloned());
        if actions.is_empty() {
            return;
        }

        let view = ctx.at(Stage::Transition, Some(transition.source.clone()), &working.variables);
        let result = self
            .invoker
            .run_actions(&actions, &view, &mut working.variables)
            .await;
        failed.extend(failures(result));
    }

    async fn run_entry(
        &self,
        steps: &[EntryStep<S, E, Env>],
        ctx: &StateContext<S, E>,
        working: &mut Configuration<S, E>,
        failed: &mut Vec<ActionFailure<S>>,
    ) -> Vec<S> {
        let mut entered = Vec::new();

        for step in steps {
            match step {
                EntryStep::Initial { owner, actions } => {
                    let view = ctx.at(Stage::Initial, owner.clone(), &working.variables);
                    let result = self
                        .invoker
                        .run_actions(actions, &view, &mut working.variables)
                        .await;
                    failed.extend(failures(result));
                }
                EntryStep::Enter(state) => {
                    if let Some(def) = self.model.state(state) {
                        let view = ctx.at(Stage::Entry, Some(state.clone()), &working.variables);
                        let result = self
                            .invoker
                            .run_actions(&def.entry, &view, &mut working.variables)
                            .await;
                        failed.extend(failures(result));
                    }
                    self.notifier.emit(Notification::StateEntered(state.clone()));
                    entered.push(state.clone());
                }
            }
        }

        entered
    }

    /// Swap in the working configuration and publish the change.
    fn commit(
        &mut self,
        working: Configuration<S, E>,
        exited: &[S],
        entered: &[S],
        cause: Cause<S, E>,
        transition: Option<String>,
        errors: &mut Vec<EngineError<S>>,
    ) {
        let model = Arc::clone(&self.model);
        let from = self.config.active_states(&model);
        self.config = working;
        let to = self.config.active_states(&model);

        for state in exited {
            for spec in model.timers(state) {
                self.timers.cancel(spec.transition);
            }
        }
        for state in entered {
            for spec in model.timers(state) {
                self.timers.arm(spec);
            }
        }

        self.journal.record(TransitionRecord {
            from: from.clone(),
            to: to.clone(),
            cause,
            transition,
            timestamp: Utc::now(),
        });
        self.notifier.emit(Notification::StateChanged { from, to });
        self.replay_pending = true;

        for completion in completions(&model, &self.config, entered) {
            match completion {
                Completion::State(state) => self.completions.push_back(state),
                Completion::Machine => {
                    tracing::info!(machine = %self.settings.machine_id, "top-level final state reached");
                    self.finished = true;
                }
            }
        }

        self.persist(errors);
    }

    /// Consume completions, then replay deferred events after state changes.
    async fn settle(&mut self) -> Vec<EngineError<S>> {
        let limit = self.settings.max_run_to_completion_steps;
        let mut errors = Vec::new();
        let mut steps = 0usize;

        loop {
            if self.finished {
                break;
            }

            if let Some(state) = self.completions.pop_front() {
                steps += 1;
                if steps > limit {
                    self.exceeded(limit, &mut errors);
                    break;
                }
                let outcome = self.step(Signal::Completion(state)).await;
                errors.extend(outcome.errors);
                continue;
            }

            if !self.replay_pending || self.config.deferred.is_empty() {
                break;
            }
            self.replay_pending = false;

            let mut batch: VecDeque<DeferredEvent<E>> = VecDeque::new();
            batch.extend(self.config.deferred.take_all());
            while let Some(deferred) = batch.pop_front() {
                steps += 1;
                if self.finished || steps > limit {
                    batch.push_front(deferred);
                    self.config.deferred.requeue(batch.drain(..));
                    if steps > limit {
                        self.exceeded(limit, &mut errors);
                    }
                    return errors;
                }

                tracing::debug!(event = ?deferred.event, "replaying deferred event");
                let outcome = self.step_event(deferred.event, deferred.payload, true).await;
                errors.extend(outcome.errors);

                while let Some(state) = self.completions.pop_front() {
                    steps += 1;
                    if steps > limit {
                        self.config.deferred.requeue(batch.drain(..));
                        self.exceeded(limit, &mut errors);
                        return errors;
                    }
                    let outcome = self.step(Signal::Completion(state)).await;
                    errors.extend(outcome.errors);
                }
            }
        }

        errors
    }

    fn exceeded(&mut self, limit: usize, errors: &mut Vec<EngineError<S>>) {
        self.completions.clear();
        self.report(EngineError::RunToCompletionExceeded { limit }, errors);
    }

    fn persist(&self, errors: &mut Vec<EngineError<S>>) {
        let Some(persister) = &self.persister else {
            return;
        };
        let snapshot = Snapshot::capture(&self.settings.machine_id, &self.model, &self.config);
        if let Err(error) = persister.persist(&snapshot) {
            self.report(EngineError::Persist(error.to_string()), errors);
        }
    }

    fn report_failures(&self, failed: Vec<ActionFailure<S>>, errors: &mut Vec<EngineError<S>>) {
        if !failed.is_empty() {
            self.report(EngineError::ActionExecution(failed), errors);
        }
    }

    fn report(&self, error: EngineError<S>, errors: &mut Vec<EngineError<S>>) {
        self.notifier.emit(Notification::Error(error.clone()));
        errors.push(error);
    }

    fn emit_started(&self, transition: &Transition<S, E, Env>) {
        self.notifier.emit(Notification::TransitionStarted {
            transition: transition.label(),
            source: transition.source.clone(),
            target: transition.target.clone(),
        });
    }

    fn emit_ended(&self, transition: &Transition<S, E, Env>) {
        self.notifier.emit(Notification::TransitionEnded {
            transition: transition.label(),
            source: transition.source.clone(),
            target: transition.target.clone(),
        });
    }
}
