//! Workflow Mediators
//!
//! A [`Process`] describes one business process: how its stateful workflow
//! is defined, which payloads may enter it, which moves the current caller
//! may make, and what happens when a segment finishes. [`WorkflowMediator`]
//! defines the workflow on first use and routes every call through the
//! process hooks.

use std::sync::Arc;

use log::{debug, info};
use once_cell::sync::OnceCell;

use crate::error::FlowError;
use crate::workflow::{Parameters, Payload, StateId};

use super::object::StatefulObject;
use super::transition::{Transition, TransitionRule};
use super::workflow::StatefulWorkflow;

/// A process an object can go through.
pub trait Process<T>: Send + Sync {
    /// Builds the workflow; called once, on first use.
    fn define(&self) -> Result<StatefulWorkflow<T>, FlowError>;

    /// Entry check for every run. Returning `false` skips the run without
    /// an error and hands the payload back unchanged.
    fn validate(&self, _payload: &T) -> bool {
        true
    }

    /// Called after every run with the states before and after it. This is
    /// where persistence belongs.
    fn on_finished(&self, _payload: &T, _from: Option<&StateId>, _to: Option<&StateId>) {}

    /// Whether the current caller may make this move.
    fn can_transition(&self, _from: Option<&StateId>, _to: &StateId) -> bool {
        true
    }
}

/// Adds the process's own transition check on top of the workflow's rule.
struct ProcessRule<T, P> {
    inner: Arc<dyn TransitionRule<T>>,
    process: Arc<P>,
}

impl<T, P> TransitionRule<T> for ProcessRule<T, P>
where
    T: 'static,
    P: Process<T>,
{
    fn is_in_workflow(&self, payload: &T) -> bool {
        self.inner.is_in_workflow(payload)
    }

    fn has_been_in_workflow(&self, payload: &T) -> Option<bool> {
        self.inner.has_been_in_workflow(payload)
    }

    fn can_transition(&self, from: Option<&StateId>, to: &StateId) -> bool {
        self.inner.can_transition(from, to) && self.process.can_transition(from, to)
    }

    fn transition(&self, payload: &mut T, to: StateId) {
        self.inner.transition(payload, to)
    }
}

/// Lazily-defined front for a [`Process`].
pub struct WorkflowMediator<T, P> {
    process: Arc<P>,
    workflow: OnceCell<StatefulWorkflow<T>>,
}

impl<T, P> WorkflowMediator<T, P>
where
    T: StatefulObject + Payload,
    P: Process<T> + 'static,
{
    pub fn new(process: P) -> Self {
        Self {
            process: Arc::new(process),
            workflow: OnceCell::new(),
        }
    }

    pub fn process(&self) -> &P {
        &self.process
    }

    /// The workflow, defined on first call.
    pub fn workflow(&self) -> Result<&StatefulWorkflow<T>, FlowError> {
        self.workflow.get_or_try_init(|| {
            let workflow = self.process.define()?;
            debug!("Defined workflow '{}'", workflow.id());

            let rule = ProcessRule {
                inner: Arc::clone(workflow.transition_rule()),
                process: Arc::clone(&self.process),
            };
            Ok(workflow.with_shared_rule(Arc::new(rule)))
        })
    }

    /// Starts or resumes the process for `payload`.
    pub fn start(&self, payload: T) -> Result<T, FlowError> {
        self.start_with_params(payload, Parameters::new())
    }

    pub fn start_with_params(&self, payload: T, parameters: Parameters) -> Result<T, FlowError> {
        let workflow = self.workflow()?;
        let from = payload.state_id(workflow.id());

        let payload = if self.process.validate(&payload) {
            workflow.start_with_params(payload, parameters)?
        } else {
            info!("Payload rejected by '{}', skipping run", workflow.id());
            payload
        };

        let to = payload.state_id(workflow.id());
        self.process.on_finished(&payload, from.as_ref(), to.as_ref());
        Ok(payload)
    }

    /// Moves open to `payload` from the state it is in now.
    pub fn possible_transitions(&self, payload: &T) -> Result<Vec<Transition>, FlowError> {
        Ok(self.workflow()?.possible_transitions_for(payload))
    }

    pub fn is_in_workflow(&self, payload: &T) -> Result<bool, FlowError> {
        Ok(self.workflow()?.is_in_workflow(payload))
    }

    pub fn has_been_in_workflow(&self, payload: &T) -> Result<Option<bool>, FlowError> {
        Ok(self.workflow()?.has_been_in_workflow(payload))
    }
}
