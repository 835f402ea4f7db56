//! Workflow Builders
//!
//! Two strategies for appending operations to a task list behind one
//! [`Builder`] contract: [`SequentialBuilder`] appends in order, while
//! [`ParallelBuilder`] collects operations into a group that runs
//! concurrently as a single step.

use std::sync::Arc;

use crate::error::FlowError;
use crate::execution::parallel::ParallelInvoker;

use super::declared::DeclaredStep;
use super::gate::Gate;
use super::operation::{Operation, Payload};
use super::task_list::{Task, TaskList};

/// Shared contract for appending operations.
///
/// Arguments are optional so that a missing operation or gate is reported
/// as [`FlowError::ArgumentNull`] before anything is appended.
pub trait Builder<T: Payload> {
    fn add_operation(&mut self, operation: Option<Operation<T>>) -> Result<(), FlowError>;

    /// Appends a gated operation; the gate is required.
    fn add_operation_if(
        &mut self,
        operation: Option<Operation<T>>,
        gate: Option<Gate<T>>,
    ) -> Result<(), FlowError>;

    /// Appends an operation anchored by a declared step.
    fn add_declared(
        &mut self,
        operation: Option<Operation<T>>,
        gate: Option<Gate<T>>,
        step: &DeclaredStep,
    ) -> Result<(), FlowError>;
}

fn require<V>(value: Option<V>, argument: &'static str) -> Result<V, FlowError> {
    value.ok_or(FlowError::ArgumentNull { argument })
}

/// Appends operations to the task list in order.
pub struct SequentialBuilder<'a, T> {
    tasks: &'a mut TaskList<T>,
}

impl<'a, T: Payload> SequentialBuilder<'a, T> {
    pub fn new(tasks: &'a mut TaskList<T>) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &TaskList<T> {
        self.tasks
    }
}

impl<T: Payload> Builder<T> for SequentialBuilder<'_, T> {
    fn add_operation(&mut self, operation: Option<Operation<T>>) -> Result<(), FlowError> {
        let operation = require(operation, "operation")?;
        self.tasks.register(Task::new(operation, None))?;
        Ok(())
    }

    fn add_operation_if(
        &mut self,
        operation: Option<Operation<T>>,
        gate: Option<Gate<T>>,
    ) -> Result<(), FlowError> {
        let operation = require(operation, "operation")?;
        let gate = require(gate, "gate")?;
        self.tasks.register(Task::new(operation, Some(gate)))?;
        Ok(())
    }

    fn add_declared(
        &mut self,
        operation: Option<Operation<T>>,
        gate: Option<Gate<T>>,
        step: &DeclaredStep,
    ) -> Result<(), FlowError> {
        let operation = require(operation, "operation")?;
        self.tasks
            .register(Task::declared(operation, gate, step.clone()))?;
        Ok(())
    }
}

/// Collects operations into a parallel group registered as one step.
///
/// Opening a builder on a list that already has steps moves the last plain
/// step into the new group, so `a.then(b).and(c)` runs `b` and `c`
/// together. Declared steps and yield boundaries stay where they are.
pub struct ParallelBuilder<'a, T> {
    tasks: &'a mut TaskList<T>,
    group: usize,
}

impl<'a, T: Payload> ParallelBuilder<'a, T> {
    /// Opens a new group at the end of `tasks`.
    pub fn new(tasks: &'a mut TaskList<T>) -> Result<Self, FlowError> {
        let mut group = ParallelInvoker::new();
        if let Some(left_over) = tasks.take_last_plain() {
            group.add(Arc::new(left_over));
        }

        let position = tasks.register(Task::new(Operation::Parallel(group), None))?;
        Ok(Self {
            tasks,
            group: position,
        })
    }

    /// Re-opens the group registered at `position`.
    pub(crate) fn attach(tasks: &'a mut TaskList<T>, position: usize) -> Self {
        Self {
            tasks,
            group: position,
        }
    }

    pub fn position(&self) -> usize {
        self.group
    }

    /// The group being built.
    pub fn parallel_operations(&self) -> Option<&ParallelInvoker<T>> {
        match self.tasks.get(self.group).map(Task::operation) {
            Some(Operation::Parallel(group)) => Some(group),
            _ => None,
        }
    }

    fn push(&mut self, task: Task<T>) -> Result<(), FlowError> {
        match self.tasks.get_mut(self.group).map(Task::operation_mut) {
            Some(Operation::Parallel(group)) => {
                group.add(Arc::new(task));
                Ok(())
            }
            _ => Err(FlowError::ArgumentNull {
                argument: "parallel group",
            }),
        }
    }
}

impl<T: Payload> Builder<T> for ParallelBuilder<'_, T> {
    fn add_operation(&mut self, operation: Option<Operation<T>>) -> Result<(), FlowError> {
        let operation = require(operation, "operation")?;
        self.push(Task::new(operation, None))
    }

    fn add_operation_if(
        &mut self,
        operation: Option<Operation<T>>,
        gate: Option<Gate<T>>,
    ) -> Result<(), FlowError> {
        let operation = require(operation, "operation")?;
        let gate = require(gate, "gate")?;
        self.push(Task::new(operation, Some(gate)))
    }

    fn add_declared(
        &mut self,
        _operation: Option<Operation<T>>,
        _gate: Option<Gate<T>>,
        step: &DeclaredStep,
    ) -> Result<(), FlowError> {
        Err(FlowError::DeclaredInParallel {
            step: step.id().clone(),
        })
    }
}
