//! Builders for choice, junction and history pseudostates.

use super::state::DEFAULT_REGION;
use crate::core::{Action, Branch, EventKey, Guard, HistoryDepth, StateContext, StateKey};

/// Guarded branches of a choice or junction.
///
/// Branches are tried in the order they were added; the first whose guard
/// holds wins, otherwise the default branch is taken.
pub struct BranchBuilder<S: StateKey, E: EventKey, Env> {
    pub(crate) branches: Vec<Branch<S, E, Env>>,
    pub(crate) default: Option<Branch<S, E, Env>>,
}

impl<S, E, Env> BranchBuilder<S, E, Env>
where
    S: StateKey,
    E: EventKey,
    Env: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            branches: Vec::new(),
            default: None,
        }
    }

    /// Route to `target` when `guard` holds.
    pub fn guarded(mut self, guard: Guard<S, E, Env>, target: S) -> Self {
        self.branches.push(Branch {
            guard: Some(guard),
            target,
            actions: Vec::new(),
        });
        self
    }

    /// Route to `target` when `predicate` holds.
    pub fn when<F>(self, predicate: F, target: S) -> Self
    where
        F: Fn(&StateContext<S, E>) -> bool + Send + Sync + 'static,
    {
        self.guarded(Guard::new(predicate), target)
    }

    /// Route to `target` when no guard holds.
    pub fn otherwise(mut self, target: S) -> Self {
        self.default = Some(Branch {
            guard: None,
            target,
            actions: Vec::new(),
        });
        self
    }

    /// Attach an action to the branch added last.
    pub fn then(mut self, action: Action<S, E, Env>) -> Self {
        let last = match self.default.as_mut() {
            Some(default) => Some(default),
            None => self.branches.last_mut(),
        };
        match last {
            Some(branch) => branch.actions.push(action),
            None => tracing::warn!("branch action added before any branch; ignored"),
        }
        self
    }
}

impl<S, E, Env> Default for BranchBuilder<S, E, Env>
where
    S: StateKey,
    E: EventKey,
    Env: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// A history pseudostate of one region.
pub struct HistoryBuilder<S: StateKey> {
    pub(crate) depth: HistoryDepth,
    pub(crate) owner: Option<S>,
    pub(crate) region: String,
    pub(crate) default: Option<S>,
}

impl<S: StateKey> HistoryBuilder<S> {
    /// Shallow history of the default region of `owner`.
    pub fn shallow(owner: S) -> Self {
        Self::of(HistoryDepth::Shallow, Some(owner))
    }

    /// Deep history of the default region of `owner`.
    pub fn deep(owner: S) -> Self {
        Self::of(HistoryDepth::Deep, Some(owner))
    }

    /// History of the top-level region.
    pub fn root(depth: HistoryDepth) -> Self {
        Self::of(depth, None)
    }

    fn of(depth: HistoryDepth, owner: Option<S>) -> Self {
        Self {
            depth,
            owner,
            region: DEFAULT_REGION.to_string(),
            default: None,
        }
    }

    pub fn in_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Target used when the region has never been visited.
    pub fn default_to(mut self, target: S) -> Self {
        self.default = Some(target);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn then_attaches_to_last_branch() {
        let branches: BranchBuilder<String, String, ()> = BranchBuilder::new()
            .when(|_| true, "A".to_string())
            .then(Action::set("a", json!(1)))
            .when(|_| false, "B".to_string());

        assert_eq!(branches.branches.len(), 2);
        assert_eq!(branches.branches[0].actions.len(), 1);
        assert!(branches.branches[1].actions.is_empty());
        assert!(branches.default.is_none());
    }

    #[test]
    fn then_after_otherwise_attaches_to_default() {
        let branches: BranchBuilder<String, String, ()> = BranchBuilder::new()
            .when(|_| true, "A".to_string())
            .otherwise("B".to_string())
            .then(Action::set("b", json!(2)));

        assert!(branches.branches[0].actions.is_empty());
        assert_eq!(branches.default.map(|d| d.actions.len()), Some(1));
    }

    #[test]
    fn history_defaults_to_default_region() {
        let history = HistoryBuilder::deep("P".to_string()).default_to("X".to_string());

        assert_eq!(history.depth, HistoryDepth::Deep);
        assert_eq!(history.region, DEFAULT_REGION);
        assert_eq!(history.default.as_deref(), Some("X"));

        let root: HistoryBuilder<String> = HistoryBuilder::root(HistoryDepth::Shallow);
        assert!(root.owner.is_none());
    }
}
