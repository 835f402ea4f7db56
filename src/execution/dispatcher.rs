//! Task List Dispatcher
//!
//! Walks a task list in registration order: evaluates each gate, follows
//! gate redirects to declared steps, invokes the operation, and routes any
//! failure through the escalation policy. A walk ends when the list runs
//! out or when it reaches a yield boundary.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::error::FlowError;
use crate::workflow::{Context, Operation, Payload, StateId, TaskList, WorkflowId};

use super::escalation::{escalate, ErrorHandler, ErrorLevel};

/// How a walk over a task list ended.
#[derive(Debug)]
pub enum Outcome<T> {
    /// Every remaining step ran (or was skipped).
    Completed(T),
    /// A yield boundary was reached; `state` is the boundary's identity.
    Yielded { payload: T, state: StateId },
}

impl<T> Outcome<T> {
    pub fn into_payload(self) -> T {
        match self {
            Self::Completed(payload) => payload,
            Self::Yielded { payload, .. } => payload,
        }
    }
}

/// Where a resumed walk re-entered the list.
///
/// Redirects to positions before `floor` would re-run steps that belong to
/// an earlier invocation and are rejected as illegal transitions.
#[derive(Debug, Clone)]
pub struct Resume {
    pub workflow: WorkflowId,
    pub from: Option<StateId>,
    pub floor: usize,
}

/// Walks `tasks` starting at `start`.
///
/// Returns `Err` only for failures the handler classified as fatal.
pub fn run<T: Payload>(
    tasks: &TaskList<T>,
    handler: &Arc<dyn ErrorHandler<T>>,
    mut payload: T,
    context: &mut Context,
    start: usize,
    resume: Option<&Resume>,
) -> Result<Outcome<T>, FlowError> {
    let mut position = start;

    while let Some(task) = tasks.get(position) {
        let label = task.label();

        if let Operation::Yield(state) = task.operation() {
            info!("Yielding at step #{} ('{}')", position, state);
            return Ok(Outcome::Yielded {
                payload,
                state: state.clone(),
            });
        }

        if let Some(gate) = task.gate() {
            if !gate.evaluate(&payload, context) {
                let Some(step) = gate.target() else {
                    debug!("Skipping step #{} ({}): gate closed", position, label);
                    position += 1;
                    continue;
                };

                let redirect = match (tasks.position_of(step.id()), resume) {
                    (None, _) => Err(FlowError::UnknownStep {
                        step: step.id().clone(),
                    }),
                    (Some(target), Some(resume)) if target < resume.floor => {
                        Err(FlowError::IllegalTransition {
                            workflow: resume.workflow.clone(),
                            from: resume.from.clone(),
                            to: Some(step.id().clone()),
                        })
                    }
                    (Some(target), _) => Ok(target),
                };

                match redirect {
                    Ok(target) => {
                        debug!(
                            "Gate on step #{} closed, going to '{}' (#{})",
                            position,
                            step.id(),
                            target
                        );
                        position = target;
                    }
                    Err(e) => match escalate(handler.as_ref(), &e, &payload) {
                        ErrorLevel::Tolerated => {
                            warn!("Ignoring redirect from step #{}: {}", position, e);
                            position += 1;
                        }
                        ErrorLevel::Fatal => {
                            error!("Aborting at step #{}: {}", position, e);
                            return Err(e);
                        }
                    },
                }
                continue;
            }
        }

        debug!("Running step #{}: {}", position, label);
        let snapshot = payload.clone();
        match task.operation().invoke(payload, context, handler) {
            Ok(next) => {
                payload = next;
                if let Some(step) = task.step() {
                    context.mark_passed(step.id());
                }
            }
            Err(e) => match escalate(handler.as_ref(), &e, &snapshot) {
                ErrorLevel::Tolerated => {
                    warn!("Step #{} ({}) failed, continuing: {}", position, label, e);
                    payload = snapshot;
                }
                ErrorLevel::Fatal => {
                    error!("Step #{} ({}) failed: {}", position, label, e);
                    return Err(e);
                }
            },
        }

        position += 1;
    }

    Ok(Outcome::Completed(payload))
}
