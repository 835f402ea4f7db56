//! Workflow Definition Module
//!
//! Types for describing what a workflow does: operations, gates, declared
//! steps, the task list they are registered into, and the builders and
//! fluent API that fill it.
//!
//! # Structure
//!
//! - [`operation`]: The operation shapes and the invocation context
//! - [`gate`]: Conditional predicates guarding a step
//! - [`declared`]: Step, state and workflow identifiers
//! - [`task_list`]: The ordered registry of (operation, gate) pairs
//! - [`builder`]: Sequential and parallel append strategies
//! - [`definition`]: The fluent [`Workflow`] API

pub mod builder;
pub mod declared;
pub mod definition;
pub mod gate;
pub mod operation;
pub mod task_list;

pub use builder::{Builder, ParallelBuilder, SequentialBuilder};
pub use declared::{Declare, DeclaredStep, StateId, StepId, WorkflowId};
pub use definition::Workflow;
pub use gate::Gate;
pub use operation::{Command, Context, Operation, Parameters, Payload};
pub use task_list::{Task, TaskList};
