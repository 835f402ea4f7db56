//! Operations
//!
//! Every step in a task list wraps one [`Operation`]: a closed set of shapes
//! (plain function, parameter-aware function, command object, nested
//! workflow, parallel group, yield boundary) behind a single `invoke`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{BoxError, FlowError};
use crate::execution::escalation::ErrorHandler;
use crate::execution::parallel::ParallelInvoker;

use super::declared::{DeclaredStep, StateId, StepId};
use super::definition::Workflow;

/// Values a workflow can run over.
///
/// Payloads are cloned before each step so that a failed step leaves the
/// last good value in place. Payloads placed in parallel groups should be
/// shared handles (for example an `Arc` around interior-mutable data): every
/// worker receives a clone, and the engine does not synchronise them.
pub trait Payload: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Payload for T {}

/// Named parameters passed to a workflow run.
pub type Parameters = HashMap<String, Value>;

/// Invocation context visible to gates and parameter-aware operations.
#[derive(Debug, Clone, Default)]
pub struct Context {
    parameters: Parameters,
    passed: HashSet<StepId>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context carrying run parameters.
    pub fn with_parameters(parameters: Parameters) -> Self {
        Self {
            parameters,
            passed: HashSet::new(),
        }
    }

    /// Returns the run parameters; an empty map counts as no parameters.
    pub fn parameters(&self) -> Option<&Parameters> {
        if self.parameters.is_empty() {
            None
        } else {
            Some(&self.parameters)
        }
    }

    /// Looks up a single run parameter.
    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    /// True once the pair anchored by `step` has run during this invocation.
    pub fn has_passed(&self, step: &DeclaredStep) -> bool {
        self.passed.contains(step.id())
    }

    pub(crate) fn mark_passed(&mut self, step: &StepId) {
        self.passed.insert(step.clone());
    }

    /// Context for a nested workflow: same parameters, fresh step history.
    pub(crate) fn nested(&self) -> Self {
        Self::with_parameters(self.parameters.clone())
    }
}

/// A reusable operation object.
///
/// ```
/// use flowline::workflow::Command;
/// use flowline::BoxError;
///
/// struct Shout;
///
/// impl Command<String> for Shout {
///     fn execute(&self, payload: String) -> Result<String, BoxError> {
///         Ok(payload.to_uppercase())
///     }
/// }
///
/// assert_eq!(Shout.execute("red".to_string()).unwrap(), "RED");
/// ```
pub trait Command<T>: Send + Sync {
    fn execute(&self, payload: T) -> Result<T, BoxError>;

    /// Name used in logs and error messages.
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

type Function<T> = dyn Fn(T) -> Result<T, BoxError> + Send + Sync;
type ContextFunction<T> = dyn Fn(T, &Context) -> Result<T, BoxError> + Send + Sync;

/// One unit of work in a task list.
pub enum Operation<T> {
    /// A function over the payload.
    Function(Arc<Function<T>>),
    /// A function that also receives the invocation context.
    Contextual(Arc<ContextFunction<T>>),
    /// A command object.
    Command(Arc<dyn Command<T>>),
    /// A nested workflow with its own task list.
    Workflow(Arc<Workflow<T>>),
    /// A group of operations run concurrently and joined once.
    Parallel(ParallelInvoker<T>),
    /// A no-op boundary where a stateful workflow records its state and stops.
    Yield(StateId),
}

impl<T: Payload> Operation<T> {
    /// Wraps an infallible function.
    pub fn function<F>(function: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        Self::Function(Arc::new(move |payload| Ok(function(payload))))
    }

    /// Wraps a function that may fail.
    pub fn fallible<F>(function: F) -> Self
    where
        F: Fn(T) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::Function(Arc::new(function))
    }

    /// Wraps a function that reads the run parameters.
    pub fn with_context<F>(function: F) -> Self
    where
        F: Fn(T, &Context) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::Contextual(Arc::new(function))
    }

    pub fn command<C>(command: C) -> Self
    where
        C: Command<T> + 'static,
    {
        Self::Command(Arc::new(command))
    }

    /// Builds the command from its type.
    pub fn construct<C>() -> Self
    where
        C: Command<T> + Default + 'static,
    {
        Self::command(C::default())
    }

    /// Nests another workflow as a single step.
    pub fn workflow(workflow: Workflow<T>) -> Self {
        Self::Workflow(Arc::new(workflow))
    }

    /// Name used in logs and error messages.
    pub fn label(&self) -> String {
        match self {
            Self::Function(_) | Self::Contextual(_) => "function".to_string(),
            Self::Command(command) => command.name().to_string(),
            Self::Workflow(workflow) => format!("workflow '{}'", workflow.name()),
            Self::Parallel(group) => format!("parallel({})", group.len()),
            Self::Yield(state) => format!("yield '{}'", state),
        }
    }

    pub fn is_yield(&self) -> bool {
        matches!(self, Self::Yield(_))
    }

    /// Runs the operation against `payload`.
    ///
    /// Operation failures are wrapped in [`FlowError::Operation`]; a nested
    /// workflow that aborts surfaces as [`FlowError::Aborted`].
    pub fn invoke(
        &self,
        payload: T,
        context: &Context,
        handler: &Arc<dyn ErrorHandler<T>>,
    ) -> Result<T, FlowError> {
        match self {
            Self::Function(function) => {
                function(payload).map_err(|e| FlowError::operation(self.label(), e))
            }
            Self::Contextual(function) => {
                function(payload, context).map_err(|e| FlowError::operation(self.label(), e))
            }
            Self::Command(command) => command
                .execute(payload)
                .map_err(|e| FlowError::operation(command.name(), e)),
            Self::Workflow(workflow) => workflow
                .execute(payload, &mut context.nested())
                .map_err(FlowError::aborted),
            Self::Parallel(group) => group.execute(payload, context, handler),
            Self::Yield(_) => Ok(payload),
        }
    }
}

impl<T> fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(_) => f.write_str("Function"),
            Self::Contextual(_) => f.write_str("Contextual"),
            Self::Command(command) => write!(f, "Command({})", command.name()),
            Self::Workflow(_) => f.write_str("Workflow"),
            Self::Parallel(_) => f.write_str("Parallel"),
            Self::Yield(state) => write!(f, "Yield({})", state),
        }
    }
}
