//! Conditional Gates
//!
//! A gate decides, per invocation, whether the pair it guards runs. A gate
//! may also name a declared step to go to when it fails; the executor then
//! redirects to the pair anchored by that step instead of skipping forward.

use std::fmt;
use std::sync::Arc;

use super::declared::DeclaredStep;
use super::operation::Context;

type Predicate<T> = dyn Fn(&T, &Context) -> bool + Send + Sync;

/// A predicate guarding one registered pair.
pub struct Gate<T> {
    predicate: Arc<Predicate<T>>,
    target: Option<DeclaredStep>,
}

impl<T> Clone for Gate<T> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
            target: self.target.clone(),
        }
    }
}

impl<T: 'static> Gate<T> {
    /// A gate with a fixed outcome.
    pub fn is_true(value: bool) -> Self {
        Self::when_context(move |_, _| value)
    }

    pub fn is_false(value: bool) -> Self {
        Self::is_true(!value)
    }

    /// A gate over the payload.
    ///
    /// ```
    /// use flowline::workflow::{Context, Gate};
    ///
    /// let gate = Gate::when(|n: &i32| *n > 2);
    /// assert!(gate.evaluate(&3, &Context::new()));
    /// assert!(!gate.evaluate(&1, &Context::new()));
    /// ```
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::when_context(move |payload, _| predicate(payload))
    }

    /// A gate over the payload and the invocation context.
    pub fn when_context<F>(predicate: F) -> Self
    where
        F: Fn(&T, &Context) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            target: None,
        }
    }

    /// Opens once `step` has run during the current invocation.
    pub fn passed(step: &DeclaredStep) -> Self {
        let step = step.clone();
        Self::when_context(move |_, context| context.has_passed(&step))
    }

    /// When the predicate fails, go to `step` instead of skipping.
    pub fn or_goto(mut self, step: &DeclaredStep) -> Self {
        self.target = Some(step.clone());
        self
    }
}

impl<T> Gate<T> {
    pub fn evaluate(&self, payload: &T, context: &Context) -> bool {
        (self.predicate)(payload, context)
    }

    /// Step to go to when the gate is closed.
    pub fn target(&self) -> Option<&DeclaredStep> {
        self.target.as_ref()
    }
}

impl<T> fmt::Debug for Gate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate").field("target", &self.target).finish()
    }
}
