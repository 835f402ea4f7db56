//! Flowline - In-Process Workflow Composition Engine
//!
//! Assemble a graph of operations over a typed payload (sequential steps,
//! nested workflows, parallel groups, gated steps) and run it against
//! concrete payloads. Stateful workflows let a long-lived process be driven
//! forward by repeated, disconnected invocations, re-entering the graph
//! from a state identifier the payload stores itself.
//!
//! # Architecture
//!
//! The library is organized into four main modules:
//!
//! - [`workflow`]: Operations, gates, task lists and the fluent definition API
//! - [`execution`]: Dispatcher, parallel groups and error escalation
//! - [`stateful`]: Resumable workflows, transition rules and mediators
//! - [`config`]: YAML engine configuration
//!
//! # Example
//!
//! ```rust
//! use flowline::workflow::{Gate, Operation, Workflow};
//!
//! fn main() -> Result<(), flowline::FlowError> {
//!     let workflow = Workflow::new()
//!         .step(Operation::function(|n: i64| n + 1))?
//!         .step_if(Operation::function(|n: i64| n * 10), Gate::when(|n: &i64| *n > 1))?;
//!
//!     assert_eq!(workflow.start(1)?, 20);
//!     assert_eq!(workflow.start(0)?, 1);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod stateful;
pub mod workflow;

// Re-export commonly used types
pub use config::{load_config, EngineConfig};
pub use error::{BoxError, FlowError};
pub use execution::{DefaultErrorHandler, ErrorHandler, ErrorLevel, StatefulErrorHandler};
pub use stateful::{StatefulObject, StatefulWorkflow, WorkflowMediator};
pub use workflow::{Declare, Gate, Operation, Workflow};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "Flowline";
