//! Stateful Workflow Module
//!
//! Resumable workflows for long-lived processes. The payload records its
//! own state identifier; each `start` runs one segment between yield
//! boundaries and records where it stopped.
//!
//! # Structure
//!
//! - [`object`]: The [`StatefulObject`] contract and a serializable state record
//! - [`transition`]: Transition rules and the [`Transition`] type
//! - [`workflow`]: The resumable [`StatefulWorkflow`]
//! - [`mediator`]: Process definitions behind a lazily-built workflow

pub mod mediator;
pub mod object;
pub mod transition;
pub mod workflow;

pub use mediator::{Process, WorkflowMediator};
pub use object::{StateRecord, StatefulObject};
pub use transition::{DefaultTransitionRule, Transition, TransitionRule};
pub use workflow::StatefulWorkflow;
