//! Error Types
//!
//! One error enum covers definition-time failures (raised while a workflow
//! is being assembled) and execution-time failures (raised while a task list
//! is walked). Execution-time failures are classified by the escalation
//! policy in [`crate::execution::escalation`].

use thiserror::Error;

use crate::workflow::{StateId, StepId, WorkflowId};

/// Error type returned by operations and commands.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while defining or running a workflow.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A required operation, gate or workflow was missing.
    #[error("argument '{argument}' must be supplied")]
    ArgumentNull { argument: &'static str },

    /// The same declared step was registered twice in one workflow.
    #[error("declared step '{step}' is already registered in this workflow")]
    DuplicateDeclaration { step: StepId },

    /// A stateful workflow was asked to make a transition it does not allow.
    #[error("illegal transition in workflow '{workflow}' from {} to {}", describe(.from), describe(.to))]
    IllegalTransition {
        workflow: WorkflowId,
        from: Option<StateId>,
        to: Option<StateId>,
    },

    /// A gate redirects to a declared step that was never registered.
    #[error("declared step '{step}' is not registered in this workflow")]
    UnknownStep { step: StepId },

    /// Declared steps anchor sequential positions and cannot join a parallel group.
    #[error("declared step '{step}' cannot be added to a parallel group")]
    DeclaredInParallel { step: StepId },

    /// An operation failed.
    #[error("step '{step}' failed: {source}")]
    Operation {
        step: String,
        #[source]
        source: BoxError,
    },

    /// A parallel worker panicked before finishing its operation.
    #[error("parallel worker for step '{step}' panicked")]
    WorkerPanicked { step: String },

    /// The completion gate of a parallel group closed without signalling.
    #[error("parallel join failed: {0}")]
    Join(String),

    /// A nested workflow aborted; the wrapped error is the fatal cause.
    #[error("nested workflow aborted: {0}")]
    Aborted(Box<FlowError>),

    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

fn describe(state: &Option<StateId>) -> String {
    match state {
        Some(state) => format!("'{}'", state),
        None => "<start>".to_string(),
    }
}

impl FlowError {
    /// Wraps a failure raised by a user operation.
    pub fn operation(step: impl Into<String>, source: BoxError) -> Self {
        Self::Operation {
            step: step.into(),
            source,
        }
    }

    /// Wraps a nested workflow's fatal error, without stacking wrappers.
    pub fn aborted(cause: FlowError) -> Self {
        match cause {
            Self::Aborted(_) => cause,
            other => Self::Aborted(Box::new(other)),
        }
    }

    /// Returns the root cause, stripping nested-workflow wrappers.
    pub fn into_cause(self) -> Self {
        match self {
            Self::Aborted(cause) => cause.into_cause(),
            other => other,
        }
    }

    /// True for errors that describe a broken definition rather than a
    /// failing operation.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            Self::ArgumentNull { .. }
                | Self::DuplicateDeclaration { .. }
                | Self::UnknownStep { .. }
                | Self::DeclaredInParallel { .. }
        )
    }

    pub fn is_illegal_transition(&self) -> bool {
        matches!(self, Self::IllegalTransition { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}
