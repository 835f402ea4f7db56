//! Parallel Execution
//!
//! Runs a group of registered pairs concurrently and joins them exactly
//! once. Each member runs on its own worker thread against a clone of the
//! payload handle; the calling thread only dispatches and waits.
//!
//! The join is a per-execution countdown: the counter starts at the group
//! size, every worker decrements it when it finishes (including by panic),
//! and the worker that takes it to zero signals a one-slot channel the
//! caller is blocked on. There is no timeout: a worker that never returns
//! holds the join forever.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, error, warn};

use crate::error::FlowError;
use crate::workflow::{Context, Payload, Task};

use super::escalation::{escalate, ErrorHandler, ErrorLevel};

/// Prefix for worker thread names.
const WORKER_THREAD_PREFIX: &str = "flowline-worker";

/// A group of operations dispatched concurrently.
pub struct ParallelInvoker<T> {
    operations: Vec<Arc<Task<T>>>,
}

/// Completion state shared by the workers of one execution.
struct Countdown {
    remaining: AtomicUsize,
    finished: SyncSender<()>,
}

type FatalSlot = Arc<Mutex<Option<FlowError>>>;

fn record_fatal(slot: &FatalSlot, error: FlowError) {
    let mut first = slot.lock().unwrap_or_else(|e| e.into_inner());
    if first.is_none() {
        *first = Some(error);
    }
}

/// Counts a worker out when dropped, whether it returned, panicked, or was
/// never started.
struct WorkerGuard {
    countdown: Arc<Countdown>,
    fatal: FatalSlot,
    label: String,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("Parallel step '{}' panicked", self.label);
            record_fatal(
                &self.fatal,
                FlowError::WorkerPanicked {
                    step: self.label.clone(),
                },
            );
        }

        if self.countdown.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            debug!("Last parallel worker finished ('{}')", self.label);
            let _ = self.countdown.finished.send(());
        }
    }
}

impl<T: Payload> ParallelInvoker<T> {
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    pub fn add(&mut self, task: Arc<Task<T>>) {
        self.operations.push(task);
    }

    pub fn operations(&self) -> &[Arc<Task<T>>] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Runs every member and blocks until all of them have finished.
    ///
    /// Members share the payload handle; the payload passed in is returned
    /// once the group has joined. Failures are classified per member with
    /// `handler`: tolerated ones are logged, and the first fatal one is
    /// returned after the join.
    pub fn execute(
        &self,
        payload: T,
        context: &Context,
        handler: &Arc<dyn ErrorHandler<T>>,
    ) -> Result<T, FlowError> {
        let count = self.operations.len();
        if count == 0 {
            return Ok(payload);
        }

        debug!("Dispatching {} parallel operations", count);

        let (finished, joined) = sync_channel(1);
        let countdown = Arc::new(Countdown {
            remaining: AtomicUsize::new(count),
            finished,
        });
        let fatal: FatalSlot = Arc::new(Mutex::new(None));

        for (index, task) in self.operations.iter().enumerate() {
            let guard = WorkerGuard {
                countdown: Arc::clone(&countdown),
                fatal: Arc::clone(&fatal),
                label: task.label(),
            };
            let task = Arc::clone(task);
            let payload = payload.clone();
            let context = context.clone();
            let handler = Arc::clone(handler);

            let spawned = thread::Builder::new()
                .name(format!("{}-{}", WORKER_THREAD_PREFIX, index))
                .spawn(move || {
                    let guard = guard;
                    run_member(&task, payload, &context, &handler, &guard.fatal);
                });

            if let Err(e) = spawned {
                error!("Failed to start parallel worker {}: {}", index, e);
                record_fatal(&fatal, FlowError::operation(task_label(self, index), Box::new(e)));
            }
        }

        // Only workers may hold the sender from here on.
        drop(countdown);

        joined
            .recv()
            .map_err(|e| FlowError::Join(format!("completion signal lost: {}", e)))?;

        debug!("Parallel group of {} joined", count);

        let first_fatal = fatal.lock().unwrap_or_else(|e| e.into_inner()).take();
        match first_fatal {
            Some(error) => Err(error),
            None => Ok(payload),
        }
    }
}

impl<T: Payload> Default for ParallelInvoker<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn task_label<T: Payload>(group: &ParallelInvoker<T>, index: usize) -> String {
    group.operations[index].label()
}

/// Body of one worker: gate, invoke, classify.
fn run_member<T: Payload>(
    task: &Task<T>,
    payload: T,
    context: &Context,
    handler: &Arc<dyn ErrorHandler<T>>,
    fatal: &FatalSlot,
) {
    let label = task.label();

    if let Some(gate) = task.gate() {
        if !gate.evaluate(&payload, context) {
            if gate.target().is_some() {
                warn!("Gate redirects are not followed inside a parallel group ('{}')", label);
            }
            debug!("Skipping parallel step '{}': gate closed", label);
            return;
        }
    }

    debug!("Running parallel step '{}'", label);
    let snapshot = payload.clone();
    if let Err(e) = task.operation().invoke(payload, context, handler) {
        match escalate(handler.as_ref(), &e, &snapshot) {
            ErrorLevel::Tolerated => warn!("Parallel step '{}' failed (tolerated): {}", label, e),
            ErrorLevel::Fatal => {
                error!("Parallel step '{}' failed: {}", label, e);
                record_fatal(fatal, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::execution::escalation::DefaultErrorHandler;
    use crate::workflow::Operation;
    use std::time::Duration;

    type Counter = Arc<AtomicUsize>;

    fn handler() -> Arc<dyn ErrorHandler<Counter>> {
        Arc::new(DefaultErrorHandler::new())
    }

    fn strict() -> Arc<dyn ErrorHandler<Counter>> {
        Arc::new(DefaultErrorHandler::strict())
    }

    fn increment() -> Arc<Task<Counter>> {
        Arc::new(Task::new(
            Operation::function(|c: Counter| {
                c.fetch_add(1, Ordering::SeqCst);
                c
            }),
            None,
        ))
    }

    fn group_of(n: usize) -> ParallelInvoker<Counter> {
        let mut group = ParallelInvoker::new();
        for _ in 0..n {
            group.add(increment());
        }
        group
    }

    #[test]
    fn test_group_sizes_join_after_all_members() {
        for n in [0usize, 1, 5, 100] {
            let group = group_of(n);
            let counter: Counter = Arc::new(AtomicUsize::new(0));

            let out = group.execute(Arc::clone(&counter), &Context::new(), &handler()).unwrap();

            assert_eq!(counter.load(Ordering::SeqCst), n, "group of {}", n);
            assert!(Arc::ptr_eq(&out, &counter));
        }
    }

    #[test]
    fn test_repeated_runs_are_independent() {
        let group = group_of(5);
        let counter: Counter = Arc::new(AtomicUsize::new(0));

        group.execute(Arc::clone(&counter), &Context::new(), &handler()).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 5);

        group.execute(Arc::clone(&counter), &Context::new(), &handler()).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_join_waits_for_slow_members() {
        let mut group = ParallelInvoker::new();
        group.add(Arc::new(Task::new(
            Operation::function(|c: Counter| {
                thread::sleep(Duration::from_millis(50));
                c.fetch_add(1, Ordering::SeqCst);
                c
            }),
            None,
        )));
        group.add(increment());

        let counter: Counter = Arc::new(AtomicUsize::new(0));
        group.execute(Arc::clone(&counter), &Context::new(), &handler()).unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_tolerated_failure_still_joins() {
        let mut group = group_of(3);
        group.add(Arc::new(Task::new(
            Operation::fallible(|_: Counter| -> Result<Counter, BoxError> { Err("flaky".into()) }),
            None,
        )));

        let counter: Counter = Arc::new(AtomicUsize::new(0));
        let result = group.execute(Arc::clone(&counter), &Context::new(), &handler());

        assert!(result.is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_fatal_failure_reported_after_join() {
        let mut group = group_of(4);
        group.add(Arc::new(Task::new(
            Operation::fallible(|_: Counter| -> Result<Counter, BoxError> { Err("broken".into()) }),
            None,
        )));

        let counter: Counter = Arc::new(AtomicUsize::new(0));
        let result = group.execute(Arc::clone(&counter), &Context::new(), &strict());

        assert!(matches!(result, Err(FlowError::Operation { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_panicking_member_does_not_hang_join() {
        let mut group = group_of(2);
        group.add(Arc::new(Task::new(
            Operation::function(|_: Counter| -> Counter { panic!("worker blew up") }),
            None,
        )));

        let counter: Counter = Arc::new(AtomicUsize::new(0));
        let result = group.execute(Arc::clone(&counter), &Context::new(), &handler());

        assert!(matches!(result, Err(FlowError::WorkerPanicked { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_closed_gate_skips_member() {
        let mut group = group_of(1);
        group.add(Arc::new(Task::new(
            Operation::function(|c: Counter| {
                c.fetch_add(100, Ordering::SeqCst);
                c
            }),
            Some(crate::workflow::Gate::is_true(false)),
        )));

        let counter: Counter = Arc::new(AtomicUsize::new(0));
        group.execute(Arc::clone(&counter), &Context::new(), &handler()).unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
