//! Guard/action invoker.

use crate::core::{Action, EventKey, Guard, GuardError, Stage, StateContext, StateKey, Variables};
use serde::{Deserialize, Serialize};
use stillwater::effect::Effect;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use thiserror::Error;

/// Result of evaluating a guard. Only `Allowed` lets a transition fire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Denied,
    Failed(GuardError),
}

impl Verdict {
    pub fn allowed(&self) -> bool {
        matches!(self, Verdict::Allowed)
    }
}

/// One failed action out of an action list.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(bound = "")]
#[error("action {} failed during {stage:?} of {state:?}: {message}", .action.as_deref().unwrap_or("<anonymous>"))]
pub struct ActionFailure<S: StateKey> {
    pub action: Option<String>,
    pub stage: Stage,
    pub state: Option<S>,
    pub message: String,
}

/// Flatten an accumulated action validation into a plain list.
pub fn failures<S: StateKey>(
    validation: Validation<(), NonEmptyVec<ActionFailure<S>>>,
) -> Vec<ActionFailure<S>> {
    match validation {
        Validation::Success(_) => Vec::new(),
        Validation::Failure(errors) => errors.iter().cloned().collect(),
    }
}

/// Runs guard and action effects against the machine environment.
#[derive(Clone, Debug)]
pub struct Invoker<Env> {
    env: Env,
}

impl<Env: Clone + Send + Sync + 'static> Invoker<Env> {
    pub fn new(env: Env) -> Self {
        Self { env }
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Evaluate a guard; a missing guard allows.
    pub async fn evaluate_guard<S: StateKey, E: EventKey>(
        &self,
        guard: Option<&Guard<S, E, Env>>,
        ctx: &StateContext<S, E>,
    ) -> Verdict {
        let Some(guard) = guard else {
            return Verdict::Allowed;
        };

        match guard.evaluate(ctx).run(&self.env).await {
            Ok(true) => Verdict::Allowed,
            Ok(false) => Verdict::Denied,
            Err(error) => {
                tracing::warn!(source = ?ctx.source(), %error, "guard evaluation failed");
                Verdict::Failed(error)
            }
        }
    }

    /// Run every action in order, accumulating ALL failures.
    ///
    /// Updates yielded by successful actions are merged into `variables`
    /// before the next action runs, so later actions observe them.
    pub async fn run_actions<S: StateKey, E: EventKey>(
        &self,
        actions: &[Action<S, E, Env>],
        ctx: &StateContext<S, E>,
        variables: &mut Variables,
    ) -> Validation<(), NonEmptyVec<ActionFailure<S>>> {
        let mut checks: Vec<Validation<(), NonEmptyVec<ActionFailure<S>>>> =
            Vec::with_capacity(actions.len());

        for action in actions {
            let view = ctx.at(ctx.stage(), ctx.state().cloned(), variables);
            match action.invoke(&view).run(&self.env).await {
                Ok(updates) => {
                    variables.extend(updates);
                    checks.push(Validation::success(()));
                }
                Err(error) => {
                    tracing::warn!(
                        action = action.name().unwrap_or("<anonymous>"),
                        stage = ?ctx.stage(),
                        state = ?ctx.state(),
                        %error,
                        "action failed"
                    );
                    checks.push(Validation::fail(ActionFailure {
                        action: action.name().map(str::to_string),
                        stage: ctx.stage(),
                        state: ctx.state().cloned(),
                        message: error.message,
                    }));
                }
            }
        }

        Validation::all_vec(checks).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ActionError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type Ctx = StateContext<String, String>;

    fn ctx(stage: Stage) -> Ctx {
        StateContext::new(stage, Variables::new())
    }

    #[tokio::test]
    async fn missing_guard_allows() {
        let invoker = Invoker::new(());
        let verdict = invoker
            .evaluate_guard::<String, String>(None, &ctx(Stage::Guard))
            .await;
        assert_eq!(verdict, Verdict::Allowed);
    }

    #[tokio::test]
    async fn failing_guard_is_closed() {
        let invoker = Invoker::new(());
        let guard: Guard<String, String, ()> = Guard::try_new(|_| Err(GuardError::new("boom")));

        let verdict = invoker.evaluate_guard(Some(&guard), &ctx(Stage::Guard)).await;

        assert!(!verdict.allowed());
        assert_eq!(verdict, Verdict::Failed(GuardError::new("boom")));
    }

    #[tokio::test]
    async fn denied_guard_is_not_an_error() {
        let invoker = Invoker::new(());
        let guard: Guard<String, String, ()> = Guard::new(|_| false);

        let verdict = invoker.evaluate_guard(Some(&guard), &ctx(Stage::Guard)).await;

        assert_eq!(verdict, Verdict::Denied);
    }

    #[tokio::test]
    async fn actions_accumulate_all_failures() {
        let invoker = Invoker::new(());
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);

        let actions: Vec<Action<String, String, ()>> = vec![
            Action::from_fn(|_| Err(ActionError::new("first"))).named("a"),
            Action::from_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            Action::from_fn(|_| Err(ActionError::new("third"))).named("c"),
        ];

        let mut vars = Variables::new();
        let result = invoker.run_actions(&actions, &ctx(Stage::Entry), &mut vars).await;
        let failed = failures(result);

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0].action.as_deref(), Some("a"));
        assert_eq!(failed[1].message, "third");
        assert_eq!(failed[1].stage, Stage::Entry);
    }

    #[tokio::test]
    async fn later_actions_observe_earlier_updates() {
        let invoker = Invoker::new(());
        let actions: Vec<Action<String, String, ()>> = vec![
            Action::set("n", json!(1)),
            Action::update(|ctx| {
                let n = ctx.variable("n").and_then(|v| v.as_i64()).unwrap_or(0);
                let mut updates = Variables::new();
                updates.insert("n".to_string(), json!(n + 1));
                Ok(updates)
            }),
        ];

        let mut vars = Variables::new();
        let result = invoker.run_actions(&actions, &ctx(Stage::Transition), &mut vars).await;

        assert!(failures(result).is_empty());
        assert_eq!(vars.get("n"), Some(&json!(2)));
    }
}
