//! Workflow Execution Module
//!
//! Runs task lists: the sequential dispatcher, the parallel group invoker,
//! the escalation policy deciding which failures abort a run, and the
//! fixed-delay policy.
//!
//! # Architecture
//!
//! - [`dispatcher`]: Walks a task list, following gates and yield boundaries
//! - [`parallel`]: Fans a group out across worker threads and joins once
//! - [`escalation`]: Classifies failures as tolerated or fatal
//! - [`interval`]: Fixed-delay policy

pub mod dispatcher;
pub mod escalation;
pub mod interval;
pub mod parallel;

pub use dispatcher::Outcome;
pub use escalation::{DefaultErrorHandler, ErrorHandler, ErrorLevel, StatefulErrorHandler};
pub use interval::Interval;
pub use parallel::ParallelInvoker;
