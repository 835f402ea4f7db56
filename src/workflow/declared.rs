//! Declared Steps
//!
//! Stable identities that anchor positions in a task list. A declared step
//! is minted once by the caller and then attached to a registered pair; the
//! same identity is later used by gates ("have we passed step X?", "go back
//! to step X") and by stateful workflows as the vocabulary a stored state
//! identifier is expressed in.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Source of process-unique ids for anonymous declared steps.
static NEXT_STEP: AtomicU64 = AtomicU64::new(1);

/// Identity of a declared step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct StepId(String);

/// A state identifier recorded on a stateful payload.
///
/// States are expressed in declared-step vocabulary: a stored state names
/// the declared step (usually a yield boundary) the workflow last reached.
pub type StateId = StepId;

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for StepId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identity of a stateful workflow; the key a payload stores its state under.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkflowId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A declared step: a named anchor for one registered pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeclaredStep {
    id: StepId,
}

impl DeclaredStep {
    /// Declares a step with a stable, caller-chosen name.
    ///
    /// Use named steps for anything that ends up in persisted state, since
    /// minted ids are only unique within one process.
    pub fn named(name: impl Into<StepId>) -> Self {
        Self { id: name.into() }
    }

    pub fn id(&self) -> &StepId {
        &self.id
    }
}

/// Factory for anonymous declared steps.
pub struct Declare;

impl Declare {
    /// Mints a new process-unique declared step.
    ///
    /// ```
    /// use flowline::workflow::Declare;
    ///
    /// let first = Declare::step();
    /// let second = Declare::step();
    /// assert_ne!(first, second);
    /// ```
    pub fn step() -> DeclaredStep {
        let n = NEXT_STEP.fetch_add(1, Ordering::Relaxed);
        DeclaredStep::named(format!("step-{}", n))
    }
}
