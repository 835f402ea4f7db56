//! Task Lists
//!
//! The ordered registry every workflow builds into. Each entry pairs one
//! operation with an optional gate and, for declared steps, the identity
//! that anchors its position.

use std::collections::HashMap;

use log::debug;

use crate::error::FlowError;

use super::declared::{DeclaredStep, StepId};
use super::gate::Gate;
use super::operation::{Operation, Payload};

/// A registered (operation, gate) pair.
#[derive(Debug)]
pub struct Task<T> {
    operation: Operation<T>,
    gate: Option<Gate<T>>,
    declared: Option<DeclaredStep>,
}

impl<T: Payload> Task<T> {
    pub fn new(operation: Operation<T>, gate: Option<Gate<T>>) -> Self {
        Self {
            operation,
            gate,
            declared: None,
        }
    }

    /// A pair anchored by a declared step.
    pub fn declared(operation: Operation<T>, gate: Option<Gate<T>>, step: DeclaredStep) -> Self {
        Self {
            operation,
            gate,
            declared: Some(step),
        }
    }

    pub fn operation(&self) -> &Operation<T> {
        &self.operation
    }

    pub(crate) fn operation_mut(&mut self) -> &mut Operation<T> {
        &mut self.operation
    }

    pub fn gate(&self) -> Option<&Gate<T>> {
        self.gate.as_ref()
    }

    pub fn step(&self) -> Option<&DeclaredStep> {
        self.declared.as_ref()
    }

    pub fn label(&self) -> String {
        match &self.declared {
            Some(step) if !self.operation.is_yield() => {
                format!("{} [{}]", self.operation.label(), step.id())
            }
            _ => self.operation.label(),
        }
    }
}

/// Ordered pairs plus the index of declared-step anchors.
#[derive(Debug)]
pub struct TaskList<T> {
    tasks: Vec<Task<T>>,
    anchors: HashMap<StepId, usize>,
}

impl<T: Payload> TaskList<T> {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            anchors: HashMap::new(),
        }
    }

    /// Appends a pair, returning its position.
    ///
    /// A declared step may anchor only one pair; a second registration
    /// fails and leaves the list unchanged.
    pub fn register(&mut self, task: Task<T>) -> Result<usize, FlowError> {
        let position = self.tasks.len();

        if let Some(step) = &task.declared {
            if self.anchors.contains_key(step.id()) {
                return Err(FlowError::DuplicateDeclaration {
                    step: step.id().clone(),
                });
            }
            self.anchors.insert(step.id().clone(), position);
        }

        debug!("Registered step #{}: {}", position, task.label());
        self.tasks.push(task);
        Ok(position)
    }

    /// Position of the pair anchored by `step`.
    pub fn position_of(&self, step: &StepId) -> Option<usize> {
        self.anchors.get(step).copied()
    }

    pub fn get(&self, position: usize) -> Option<&Task<T>> {
        self.tasks.get(position)
    }

    pub fn tasks(&self) -> &[Task<T>] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Removes the last pair if it is a plain (unanchored, non-yield) step.
    pub(crate) fn take_last_plain(&mut self) -> Option<Task<T>> {
        match self.tasks.last() {
            Some(task) if task.declared.is_none() && !task.operation.is_yield() => self.tasks.pop(),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, position: usize) -> Option<&mut Task<T>> {
        self.tasks.get_mut(position)
    }
}

impl<T: Payload> Default for TaskList<T> {
    fn default() -> Self {
        Self::new()
    }
}
