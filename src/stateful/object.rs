//! Stateful Objects
//!
//! A stateful payload reports and stores its own state identifier, one per
//! workflow it takes part in. Persisting the payload between invocations is
//! the caller's job; the engine only reads and writes the identifier.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::{StateId, WorkflowId};

/// A payload that records where it is in each workflow.
pub trait StatefulObject {
    /// The state last recorded for `workflow`, if any.
    fn state_id(&self, workflow: &WorkflowId) -> Option<StateId>;

    fn set_state_id(&mut self, workflow: &WorkflowId, state: StateId);
}

/// Serializable per-workflow state storage.
///
/// Payloads can embed a record and delegate [`StatefulObject`] to it:
///
/// ```
/// use flowline::stateful::{StateRecord, StatefulObject};
/// use flowline::workflow::{StateId, WorkflowId};
///
/// let mut record = StateRecord::new();
/// let review = WorkflowId::new("review");
///
/// assert!(record.state_id(&review).is_none());
/// record.set_state_id(&review, StateId::new("submitted"));
/// assert_eq!(record.state_id(&review), Some(StateId::new("submitted")));
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct StateRecord {
    states: BTreeMap<WorkflowId, StateId>,

    /// Last time any state was recorded
    updated: Option<DateTime<Utc>>,
}

impl StateRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.updated
    }

    /// Forgets the state for `workflow`, so the next run starts fresh.
    pub fn clear(&mut self, workflow: &WorkflowId) -> Option<StateId> {
        self.states.remove(workflow)
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl StatefulObject for StateRecord {
    fn state_id(&self, workflow: &WorkflowId) -> Option<StateId> {
        self.states.get(workflow).cloned()
    }

    fn set_state_id(&mut self, workflow: &WorkflowId, state: StateId) {
        self.states.insert(workflow.clone(), state);
        self.updated = Some(Utc::now());
    }
}
