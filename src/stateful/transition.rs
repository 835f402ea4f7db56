//! Transition Rules
//!
//! Decides which state changes a stateful workflow may make and whether a
//! payload is currently inside the workflow.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::workflow::{StateId, WorkflowId};

use super::object::StatefulObject;

/// A move between two recorded states; `from` is `None` for a fresh start.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transition {
    pub from: Option<StateId>,
    pub to: StateId,
}

impl Transition {
    pub fn new(from: Option<StateId>, to: StateId) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.from {
            Some(from) => write!(f, "{} -> {}", from, self.to),
            None => write!(f, "<start> -> {}", self.to),
        }
    }
}

/// Policy consulted by stateful workflows.
pub trait TransitionRule<T>: Send + Sync {
    /// True while `payload` is part way through the workflow.
    fn is_in_workflow(&self, payload: &T) -> bool;

    /// Whether `payload` has ever entered the workflow; `None` when that
    /// cannot be determined.
    fn has_been_in_workflow(&self, payload: &T) -> Option<bool>;

    fn can_transition(&self, from: Option<&StateId>, to: &StateId) -> bool;

    /// Records `to` on `payload`.
    fn transition(&self, payload: &mut T, to: StateId);
}

/// Rule backed by a state table and a list of forbidden moves.
///
/// Any recorded state counts as inside the workflow unless it was marked
/// as an exit state.
#[derive(Debug, Clone)]
pub struct DefaultTransitionRule {
    workflow: WorkflowId,
    states: HashMap<StateId, bool>,
    forbidden: HashSet<(Option<StateId>, StateId)>,
}

impl DefaultTransitionRule {
    pub fn new(workflow: impl Into<WorkflowId>) -> Self {
        Self {
            workflow: workflow.into(),
            states: HashMap::new(),
            forbidden: HashSet::new(),
        }
    }

    pub fn workflow(&self) -> &WorkflowId {
        &self.workflow
    }

    /// Marks `state` as leaving the workflow.
    pub fn exit_state(mut self, state: impl Into<StateId>) -> Self {
        self.states.insert(state.into(), false);
        self
    }

    /// Forbids moving from `from` (or from a fresh start) to `to`.
    pub fn forbid(mut self, from: Option<StateId>, to: impl Into<StateId>) -> Self {
        self.forbidden.insert((from, to.into()));
        self
    }

    fn counts_as_inside(&self, state: &StateId) -> bool {
        self.states.get(state).copied().unwrap_or(true)
    }
}

impl<T: StatefulObject> TransitionRule<T> for DefaultTransitionRule {
    fn is_in_workflow(&self, payload: &T) -> bool {
        payload
            .state_id(&self.workflow)
            .map_or(false, |state| self.counts_as_inside(&state))
    }

    fn has_been_in_workflow(&self, payload: &T) -> Option<bool> {
        payload.state_id(&self.workflow).map(|_| true)
    }

    fn can_transition(&self, from: Option<&StateId>, to: &StateId) -> bool {
        !self.forbidden.contains(&(from.cloned(), to.clone()))
    }

    fn transition(&self, payload: &mut T, to: StateId) {
        payload.set_state_id(&self.workflow, to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stateful::StateRecord;

    fn rule() -> DefaultTransitionRule {
        DefaultTransitionRule::new("workflow")
    }

    fn object_in(state: &str) -> StateRecord {
        let mut record = StateRecord::new();
        record.set_state_id(&WorkflowId::new("workflow"), StateId::new(state));
        record
    }

    #[test]
    fn test_starts_in_workflow() {
        let object = object_in("begin");
        assert!(TransitionRule::<StateRecord>::is_in_workflow(&rule(), &object));
    }

    #[test]
    fn test_can_transition() {
        let rule = rule();
        let mut object = object_in("begin");

        rule.transition(&mut object, StateId::new("end"));

        assert!(rule.is_in_workflow(&object));
        assert_eq!(rule.has_been_in_workflow(&object), Some(true));
        assert_eq!(object.state_id(&WorkflowId::new("workflow")), Some(StateId::new("end")));
    }

    #[test]
    fn test_no_state_is_unknown() {
        let rule = rule();
        let object = StateRecord::new();

        assert!(!rule.is_in_workflow(&object));
        assert_eq!(rule.has_been_in_workflow(&object), None);
    }

    #[test]
    fn test_exit_state_leaves_workflow() {
        let rule = rule().exit_state("done");
        let mut object = object_in("begin");

        rule.transition(&mut object, StateId::new("done"));

        assert!(!rule.is_in_workflow(&object));
        assert_eq!(rule.has_been_in_workflow(&object), Some(true));
    }

    #[test]
    fn test_forbidden_transitions() {
        let rule = rule()
            .forbid(Some(StateId::new("draft")), "published")
            .forbid(None, "approved");

        let draft = StateId::new("draft");
        assert!(!TransitionRule::<StateRecord>::can_transition(&rule, Some(&draft), &StateId::new("published")));
        assert!(!TransitionRule::<StateRecord>::can_transition(&rule, None, &StateId::new("approved")));
        assert!(TransitionRule::<StateRecord>::can_transition(&rule, Some(&draft), &StateId::new("approved")));
    }

    #[test]
    fn test_transition_display() {
        let fresh = Transition::new(None, StateId::new("submitted"));
        let onward = Transition::new(Some(StateId::new("submitted")), StateId::new("reviewed"));

        assert_eq!(fresh.to_string(), "<start> -> submitted");
        assert_eq!(onward.to_string(), "submitted -> reviewed");
    }
}
