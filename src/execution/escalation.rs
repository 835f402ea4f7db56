//! Error Escalation
//!
//! Every failing step is classified as [`ErrorLevel::Tolerated`] (log it and
//! carry on with the next step) or [`ErrorLevel::Fatal`] (abort the task
//! list and every enclosing workflow without recording new state).

use log::debug;

use crate::error::FlowError;

/// Severity assigned to a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorLevel {
    /// Execution continues with the next step.
    Tolerated,
    /// Execution of the whole workflow stops.
    Fatal,
}

/// Classifies failures raised while a workflow runs.
pub trait ErrorHandler<T>: Send + Sync {
    fn handle(&self, error: &FlowError, payload: &T) -> ErrorLevel;
}

/// Base policy: tolerate operation failures unless running strict.
///
/// Broken definitions (an unknown goto target, for instance) are always
/// fatal since every later run would hit them too.
#[derive(Debug, Clone, Default)]
pub struct DefaultErrorHandler {
    strict: bool,
}

impl DefaultErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler that escalates every failure to fatal.
    pub fn strict() -> Self {
        Self { strict: true }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }
}

impl<T> ErrorHandler<T> for DefaultErrorHandler {
    fn handle(&self, error: &FlowError, _payload: &T) -> ErrorLevel {
        if self.strict || error.is_definition_error() {
            ErrorLevel::Fatal
        } else {
            ErrorLevel::Tolerated
        }
    }
}

/// Policy for stateful workflows.
///
/// Illegal transitions are always fatal, which is how an in-progress
/// process is halted instead of being moved into a state it cannot be in.
/// Everything else goes to the base policy.
#[derive(Debug, Clone, Default)]
pub struct StatefulErrorHandler {
    base: DefaultErrorHandler,
}

impl StatefulErrorHandler {
    pub fn new(base: DefaultErrorHandler) -> Self {
        Self { base }
    }

    pub fn strict() -> Self {
        Self::new(DefaultErrorHandler::strict())
    }
}

impl<T> ErrorHandler<T> for StatefulErrorHandler {
    fn handle(&self, error: &FlowError, payload: &T) -> ErrorLevel {
        if error.is_illegal_transition() {
            return ErrorLevel::Fatal;
        }
        self.base.handle(error, payload)
    }
}

/// Classifies `error` with `handler`.
///
/// A nested workflow that aborted has already been judged fatal by its own
/// handler, so it stays fatal whatever the enclosing handler says.
pub fn escalate<T>(handler: &dyn ErrorHandler<T>, error: &FlowError, payload: &T) -> ErrorLevel {
    if error.is_aborted() {
        return ErrorLevel::Fatal;
    }
    let level = handler.handle(error, payload);
    debug!("Classified failure as {:?}: {}", level, error);
    level
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowId;

    fn operation_error() -> FlowError {
        FlowError::operation("#0 function", "boom".into())
    }

    fn illegal() -> FlowError {
        FlowError::IllegalTransition {
            workflow: WorkflowId::new("wf"),
            from: None,
            to: None,
        }
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(ErrorLevel::Tolerated < ErrorLevel::Fatal);
    }

    #[test]
    fn test_default_tolerates_operation_failures() {
        let handler = DefaultErrorHandler::new();
        assert_eq!(handler.handle(&operation_error(), &()), ErrorLevel::Tolerated);
    }

    #[test]
    fn test_strict_escalates() {
        let handler = DefaultErrorHandler::strict();
        assert!(handler.is_strict());
        assert_eq!(handler.handle(&operation_error(), &()), ErrorLevel::Fatal);
    }

    #[test]
    fn test_definition_errors_are_fatal() {
        let handler = DefaultErrorHandler::new();
        let error = FlowError::UnknownStep { step: "missing".into() };
        assert_eq!(handler.handle(&error, &()), ErrorLevel::Fatal);
    }

    #[test]
    fn test_base_tolerates_illegal_transition() {
        let handler = DefaultErrorHandler::new();
        assert_eq!(handler.handle(&illegal(), &()), ErrorLevel::Tolerated);
    }

    #[test]
    fn test_stateful_illegal_transition_is_fatal() {
        let handler = StatefulErrorHandler::default();
        assert_eq!(handler.handle(&illegal(), &()), ErrorLevel::Fatal);
        assert_eq!(handler.handle(&operation_error(), &()), ErrorLevel::Tolerated);
    }

    #[test]
    fn test_stateful_strict_defers_to_base() {
        let handler = StatefulErrorHandler::strict();
        assert_eq!(handler.handle(&operation_error(), &()), ErrorLevel::Fatal);
    }

    #[test]
    fn test_escalate_keeps_aborts_fatal() {
        let handler = DefaultErrorHandler::new();
        let aborted = FlowError::aborted(operation_error());
        assert_eq!(escalate::<()>(&handler, &aborted, &()), ErrorLevel::Fatal);
        assert_eq!(escalate::<()>(&handler, &operation_error(), &()), ErrorLevel::Tolerated);
    }
}
