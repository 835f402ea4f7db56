//! Workflow Definitions
//!
//! [`Workflow`] is the fluent entry point: each call appends to the
//! workflow's own task list, and `start` runs it against a payload.
//!
//! # Example
//!
//! ```
//! use flowline::workflow::{Gate, Operation, Workflow};
//!
//! fn main() -> Result<(), flowline::FlowError> {
//!     let workflow = Workflow::new()
//!         .step(Operation::function(|s: String| s.trim().to_string()))?
//!         .step_if(
//!             Operation::function(|s: String| s.to_uppercase()),
//!             Gate::when(|s: &String| s.len() < 10),
//!         )?;
//!
//!     assert_eq!(workflow.start("  red ".to_string())?, "RED");
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use log::{error, info};

use crate::config::EngineConfig;
use crate::error::FlowError;
use crate::execution::dispatcher::{self, Outcome, Resume};
use crate::execution::escalation::{DefaultErrorHandler, ErrorHandler};

use super::builder::{Builder, ParallelBuilder, SequentialBuilder};
use super::declared::DeclaredStep;
use super::gate::Gate;
use super::operation::{Context, Operation, Parameters, Payload};
use super::task_list::{Task, TaskList};

/// Default name for workflows that were not given one.
const DEFAULT_NAME: &str = "workflow";

/// An ordered graph of operations over one payload type.
pub struct Workflow<T> {
    name: String,
    tasks: TaskList<T>,
    handler: Arc<dyn ErrorHandler<T>>,
    open_group: Option<usize>,
}

impl<T: Payload> Workflow<T> {
    pub fn new() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            tasks: TaskList::new(),
            handler: Arc::new(DefaultErrorHandler::new()),
            open_group: None,
        }
    }

    /// Alias of [`Workflow::new`] that reads well at the head of a chain.
    pub fn definition() -> Self {
        Self::new()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replaces the escalation policy.
    pub fn with_error_handler<H>(mut self, handler: H) -> Self
    where
        H: ErrorHandler<T> + 'static,
    {
        self.handler = Arc::new(handler);
        self
    }

    /// Escalates every failure to fatal.
    pub fn strict(self) -> Self {
        self.with_error_handler(DefaultErrorHandler::strict())
    }

    /// Applies engine settings; a non-strict config keeps the current handler.
    pub fn with_config(self, config: &EngineConfig) -> Self {
        if config.strict {
            self.strict()
        } else {
            self
        }
    }

    pub fn tasks(&self) -> &TaskList<T> {
        &self.tasks
    }

    /// Appends an operation.
    pub fn step(mut self, operation: Operation<T>) -> Result<Self, FlowError> {
        self.sequential().add_operation(Some(operation))?;
        Ok(self)
    }

    /// Appends an operation that runs only when `gate` is open.
    pub fn step_if(mut self, operation: Operation<T>, gate: Gate<T>) -> Result<Self, FlowError> {
        self.sequential().add_operation_if(Some(operation), Some(gate))?;
        Ok(self)
    }

    /// Appends an operation anchored by a declared step.
    pub fn declare(mut self, operation: Operation<T>, step: &DeclaredStep) -> Result<Self, FlowError> {
        self.sequential().add_declared(Some(operation), None, step)?;
        Ok(self)
    }

    pub fn declare_if(
        mut self,
        operation: Operation<T>,
        gate: Gate<T>,
        step: &DeclaredStep,
    ) -> Result<Self, FlowError> {
        self.sequential().add_declared(Some(operation), Some(gate), step)?;
        Ok(self)
    }

    /// Runs `operation` alongside the previous step.
    ///
    /// The first `and` after a plain step pulls that step into a new
    /// parallel group; further `and` calls join the same group until the
    /// next sequential step or [`Workflow::then`].
    pub fn and(mut self, operation: Operation<T>) -> Result<Self, FlowError> {
        self.parallel()?.add_operation(Some(operation))?;
        Ok(self)
    }

    pub fn and_if(mut self, operation: Operation<T>, gate: Gate<T>) -> Result<Self, FlowError> {
        self.parallel()?.add_operation_if(Some(operation), Some(gate))?;
        Ok(self)
    }

    /// Closes the current parallel group.
    pub fn then(mut self) -> Self {
        self.open_group = None;
        self
    }

    fn sequential(&mut self) -> SequentialBuilder<'_, T> {
        self.open_group = None;
        SequentialBuilder::new(&mut self.tasks)
    }

    fn parallel(&mut self) -> Result<ParallelBuilder<'_, T>, FlowError> {
        match self.open_group {
            Some(position) => Ok(ParallelBuilder::attach(&mut self.tasks, position)),
            None => {
                let builder = ParallelBuilder::new(&mut self.tasks)?;
                self.open_group = Some(builder.position());
                Ok(builder)
            }
        }
    }

    /// Appends a yield boundary; used by stateful workflows.
    pub(crate) fn push_yield(&mut self, step: DeclaredStep) -> Result<(), FlowError> {
        self.open_group = None;
        let state = step.id().clone();
        self.tasks
            .register(Task::declared(Operation::Yield(state), None, step))?;
        Ok(())
    }

    /// Runs the workflow against `payload`.
    ///
    /// Returns the payload as it stands after the last step, or the cause
    /// of the first fatal failure.
    pub fn start(&self, payload: T) -> Result<T, FlowError> {
        self.start_with_params(payload, Parameters::new())
    }

    /// Runs the workflow with named parameters visible to every step.
    pub fn start_with_params(&self, payload: T, parameters: Parameters) -> Result<T, FlowError> {
        info!("Starting workflow '{}' ({} steps)", self.name, self.tasks.len());

        let mut context = Context::with_parameters(parameters);
        match self.execute(payload, &mut context) {
            Ok(payload) => {
                info!("Workflow '{}' completed", self.name);
                Ok(payload)
            }
            Err(e) => {
                let cause = e.into_cause();
                error!("Workflow '{}' aborted: {}", self.name, cause);
                Err(cause)
            }
        }
    }

    /// Runs every step from the top; used for nested workflows.
    pub(crate) fn execute(&self, payload: T, context: &mut Context) -> Result<T, FlowError> {
        dispatcher::run(&self.tasks, &self.handler, payload, context, 0, None)
            .map(Outcome::into_payload)
    }

    /// Runs from `start`, stopping at the first yield boundary.
    pub(crate) fn resume(
        &self,
        payload: T,
        context: &mut Context,
        start: usize,
        resume: &Resume,
    ) -> Result<Outcome<T>, FlowError> {
        dispatcher::run(&self.tasks, &self.handler, payload, context, start, Some(resume))
    }
}

impl<T: Payload> Default for Workflow<T> {
    fn default() -> Self {
        Self::new()
    }
}
