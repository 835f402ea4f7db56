//! Stateful Workflows
//!
//! A stateful workflow is driven forward by repeated, disconnected calls to
//! `start`. Each call reads the payload's recorded state, re-enters the task
//! list just after the yield boundary with that identity, runs up to the
//! next boundary (or the end of the list) and records the new state.
//!
//! Nothing is written when a run aborts: the payload keeps the state it had
//! on entry, so the same segment can be retried.

use std::sync::Arc;

use log::{error, info};

use crate::config::EngineConfig;
use crate::error::FlowError;
use crate::execution::dispatcher::{Outcome, Resume};
use crate::execution::escalation::StatefulErrorHandler;
use crate::workflow::{
    Context, DeclaredStep, Gate, Operation, Parameters, Payload, StateId, Workflow, WorkflowId,
};

use super::object::StatefulObject;
use super::transition::{DefaultTransitionRule, Transition, TransitionRule};

/// Suffix of the state recorded when a workflow runs to completion.
const END_STATE_SUFFIX: &str = "end";

/// A resumable workflow over a payload that records its own state.
pub struct StatefulWorkflow<T> {
    id: WorkflowId,
    workflow: Workflow<T>,
    rule: Arc<dyn TransitionRule<T>>,
    yields: Vec<StateId>,
    end: StateId,
}

impl<T: StatefulObject + Payload> StatefulWorkflow<T> {
    pub fn new(id: impl Into<WorkflowId>) -> Self {
        let id = id.into();
        let end = StateId::new(format!("{}:{}", id, END_STATE_SUFFIX));
        let rule = DefaultTransitionRule::new(id.clone()).exit_state(end.clone());

        Self {
            workflow: Workflow::new()
                .named(id.as_str())
                .with_error_handler(StatefulErrorHandler::default()),
            rule: Arc::new(rule),
            yields: Vec::new(),
            id,
            end,
        }
    }

    pub fn id(&self) -> &WorkflowId {
        &self.id
    }

    /// State recorded once the task list has run out.
    pub fn end_state(&self) -> &StateId {
        &self.end
    }

    pub fn workflow(&self) -> &Workflow<T> {
        &self.workflow
    }

    pub fn transition_rule(&self) -> &Arc<dyn TransitionRule<T>> {
        &self.rule
    }

    /// Replaces the transition rule.
    ///
    /// The end state only leaves the workflow if the new rule says so.
    pub fn with_transition_rule<R>(self, rule: R) -> Self
    where
        R: TransitionRule<T> + 'static,
    {
        self.with_shared_rule(Arc::new(rule))
    }

    pub(crate) fn with_shared_rule(mut self, rule: Arc<dyn TransitionRule<T>>) -> Self {
        self.rule = rule;
        self
    }

    /// Escalates every failure to fatal; illegal transitions already are.
    pub fn strict(mut self) -> Self {
        self.workflow = self.workflow.with_error_handler(StatefulErrorHandler::strict());
        self
    }

    pub fn with_config(self, config: &EngineConfig) -> Self {
        if config.strict {
            self.strict()
        } else {
            self
        }
    }

    pub fn step(self, operation: Operation<T>) -> Result<Self, FlowError> {
        self.map(|w| w.step(operation))
    }

    pub fn step_if(self, operation: Operation<T>, gate: Gate<T>) -> Result<Self, FlowError> {
        self.map(|w| w.step_if(operation, gate))
    }

    pub fn declare(self, operation: Operation<T>, step: &DeclaredStep) -> Result<Self, FlowError> {
        self.map(|w| w.declare(operation, step))
    }

    pub fn declare_if(
        self,
        operation: Operation<T>,
        gate: Gate<T>,
        step: &DeclaredStep,
    ) -> Result<Self, FlowError> {
        self.map(|w| w.declare_if(operation, gate, step))
    }

    pub fn and(self, operation: Operation<T>) -> Result<Self, FlowError> {
        self.map(|w| w.and(operation))
    }

    pub fn and_if(self, operation: Operation<T>, gate: Gate<T>) -> Result<Self, FlowError> {
        self.map(|w| w.and_if(operation, gate))
    }

    pub fn then(mut self) -> Self {
        self.workflow = self.workflow.then();
        self
    }

    /// Adds a yield boundary: a run that reaches it records `state` and
    /// stops, and the next run picks up right after it.
    pub fn yield_at(mut self, state: impl Into<StateId>) -> Result<Self, FlowError> {
        let state = state.into();
        self.workflow.push_yield(DeclaredStep::named(state.clone()))?;
        self.yields.push(state);
        Ok(self)
    }

    fn map<F>(mut self, build: F) -> Result<Self, FlowError>
    where
        F: FnOnce(Workflow<T>) -> Result<Workflow<T>, FlowError>,
    {
        self.workflow = build(self.workflow)?;
        Ok(self)
    }

    /// Runs the next segment for `payload`.
    pub fn start(&self, payload: T) -> Result<T, FlowError> {
        self.start_with_params(payload, Parameters::new())
    }

    /// Runs the next segment with named parameters.
    ///
    /// Fails with [`FlowError::IllegalTransition`] when the recorded state is
    /// not a yield boundary of this workflow, when the payload has already
    /// left the workflow, or when the rule forbids the move the segment
    /// would make. A forbidden move is refused before any step runs. In
    /// every failure case the recorded state is left as is.
    ///
    /// Declared steps before the entry point count as passed for
    /// [`Gate::passed`](crate::workflow::Gate::passed).
    pub fn start_with_params(&self, payload: T, parameters: Parameters) -> Result<T, FlowError> {
        let from = payload.state_id(&self.id);
        let entry = self.entry_point(&payload, from.as_ref())?;

        match &from {
            Some(state) => info!("Resuming workflow '{}' from '{}' at step #{}", self.id, state, entry),
            None => info!("Starting workflow '{}'", self.id),
        }

        let planned = self.next_boundary(entry);
        if !self.rule.can_transition(from.as_ref(), &planned) {
            let e = self.illegal(from, Some(planned));
            error!("Workflow '{}' refused: {}", self.id, e);
            return Err(e);
        }

        let resume = Resume {
            workflow: self.id.clone(),
            from: from.clone(),
            floor: entry,
        };
        let mut context = Context::with_parameters(parameters);
        for task in &self.workflow.tasks().tasks()[..entry] {
            if let Some(step) = task.step() {
                context.mark_passed(step.id());
            }
        }

        let outcome = self
            .workflow
            .resume(payload, &mut context, entry, &resume)
            .map_err(|e| {
                let cause = e.into_cause();
                error!("Workflow '{}' aborted: {}", self.id, cause);
                cause
            })?;

        let (mut payload, to) = match outcome {
            Outcome::Yielded { payload, state } => (payload, state),
            Outcome::Completed(payload) => (payload, self.end.clone()),
        };

        // A forward redirect can land past the planned boundary.
        if to != planned && !self.rule.can_transition(from.as_ref(), &to) {
            let e = self.illegal(from, Some(to));
            error!("Workflow '{}' aborted: {}", self.id, e);
            return Err(e);
        }

        info!("Workflow '{}' is now at '{}'", self.id, to);
        self.rule.transition(&mut payload, to);
        Ok(payload)
    }

    /// Position to start walking from for a payload in state `from`.
    fn entry_point(&self, payload: &T, from: Option<&StateId>) -> Result<usize, FlowError> {
        let Some(state) = from else {
            return Ok(0);
        };

        if !self.rule.is_in_workflow(payload) {
            return Err(self.illegal(Some(state.clone()), None));
        }

        if !self.yields.contains(state) {
            return Err(self.illegal(Some(state.clone()), None));
        }

        match self.workflow.tasks().position_of(state) {
            Some(anchor) => Ok(anchor + 1),
            None => Err(self.illegal(Some(state.clone()), None)),
        }
    }

    /// The boundary a segment entered at `entry` stops at, unless a gate
    /// redirects it.
    fn next_boundary(&self, entry: usize) -> StateId {
        self.workflow.tasks().tasks()[entry.min(self.workflow.tasks().len())..]
            .iter()
            .find_map(|task| match task.operation() {
                Operation::Yield(state) => Some(state.clone()),
                _ => None,
            })
            .unwrap_or_else(|| self.end.clone())
    }

    fn illegal(&self, from: Option<StateId>, to: Option<StateId>) -> FlowError {
        FlowError::IllegalTransition {
            workflow: self.id.clone(),
            from,
            to,
        }
    }

    /// Every move the workflow can make, in order, that the rule allows.
    pub fn possible_transitions(&self) -> Vec<Transition> {
        let froms = std::iter::once(None).chain(self.yields.iter().cloned().map(Some));
        let tos = self.yields.iter().chain(std::iter::once(&self.end));

        froms
            .zip(tos)
            .map(|(from, to)| Transition::new(from, to.clone()))
            .filter(|t| self.rule.can_transition(t.from.as_ref(), &t.to))
            .collect()
    }

    /// The moves open to `payload` from the state it is in now.
    pub fn possible_transitions_for(&self, payload: &T) -> Vec<Transition> {
        let current = payload.state_id(&self.id);
        self.possible_transitions()
            .into_iter()
            .filter(|t| t.from == current)
            .collect()
    }

    pub fn is_in_workflow(&self, payload: &T) -> bool {
        self.rule.is_in_workflow(payload)
    }

    pub fn has_been_in_workflow(&self, payload: &T) -> Option<bool> {
        self.rule.has_been_in_workflow(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::stateful::StateRecord;
    use crate::workflow::Declare;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Payload that counts the feedback points it passes.
    #[derive(Clone, Default)]
    struct Probe {
        record: StateRecord,
        hits: Arc<Mutex<HashMap<&'static str, usize>>>,
    }

    impl Probe {
        fn feedback(self, point: &'static str) -> Self {
            *self.hits.lock().unwrap().entry(point).or_insert(0) += 1;
            self
        }

        fn hits(&self, point: &str) -> usize {
            self.hits.lock().unwrap().get(point).copied().unwrap_or(0)
        }

        fn state(&self, workflow: &str) -> Option<StateId> {
            self.record.state_id(&WorkflowId::new(workflow))
        }
    }

    impl StatefulObject for Probe {
        fn state_id(&self, workflow: &WorkflowId) -> Option<StateId> {
            self.record.state_id(workflow)
        }

        fn set_state_id(&mut self, workflow: &WorkflowId, state: StateId) {
            self.record.set_state_id(workflow, state);
        }
    }

    fn point(name: &'static str) -> Operation<Probe> {
        Operation::function(move |p: Probe| p.feedback(name))
    }

    /// branch point, a gated first point that loops back to it, a yield,
    /// then a gated second point that also loops back.
    fn branching(tracker: Arc<AtomicUsize>) -> StatefulWorkflow<Probe> {
        let branch = Declare::step();
        let timer = Arc::new(AtomicUsize::new(0));

        let reset = Arc::clone(&tracker);
        let first = Arc::clone(&tracker);
        let second = Arc::clone(&tracker);

        StatefulWorkflow::new("test")
            .declare(
                Operation::function(move |p: Probe| {
                    if timer.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
                        reset.store(0, Ordering::SeqCst);
                    }
                    p.feedback("branch point")
                }),
                &branch,
            )
            .unwrap()
            .step_if(
                point("first point"),
                Gate::when(move |_: &Probe| first.load(Ordering::SeqCst) < 2).or_goto(&branch),
            )
            .unwrap()
            .yield_at("1")
            .unwrap()
            .step_if(
                point("second point"),
                Gate::when(move |_: &Probe| second.load(Ordering::SeqCst) < 1).or_goto(&branch),
            )
            .unwrap()
    }

    #[test]
    fn test_hits_every_point_when_no_gate_fails() {
        let tracker = Arc::new(AtomicUsize::new(0));
        let sut = branching(tracker);

        let probe = sut.start(Probe::default()).unwrap();
        let probe = sut.start(probe).unwrap();

        assert_eq!(probe.hits("branch point"), 1);
        assert_eq!(probe.hits("first point"), 1);
        assert_eq!(probe.hits("second point"), 1);
    }

    #[test]
    fn test_hits_branch_twice_when_first_gate_fails() {
        let tracker = Arc::new(AtomicUsize::new(2));
        let sut = branching(tracker);

        let probe = sut.start(Probe::default()).unwrap();
        let probe = sut.start(probe).unwrap();

        assert_eq!(probe.hits("branch point"), 2);
        assert_eq!(probe.hits("first point"), 1);
        assert_eq!(probe.hits("second point"), 1);
    }

    #[test]
    fn test_loop_back_across_yield_is_illegal() {
        let tracker = Arc::new(AtomicUsize::new(1));
        let sut = branching(tracker);

        let probe = sut.start(Probe::default()).unwrap();
        assert_eq!(probe.state("test"), Some(StateId::new("1")));

        let result = sut.start(probe.clone());
        assert!(matches!(result, Err(FlowError::IllegalTransition { .. })));
        assert_eq!(probe.state("test"), Some(StateId::new("1")));
        assert_eq!(probe.hits("second point"), 0);
    }

    #[test]
    fn test_segments_resume_after_each_yield() {
        let sut = StatefulWorkflow::new("review")
            .step(point("a"))
            .unwrap()
            .yield_at("submitted")
            .unwrap()
            .step(point("b"))
            .unwrap()
            .yield_at("reviewed")
            .unwrap()
            .step(point("c"))
            .unwrap();

        let probe = sut.start(Probe::default()).unwrap();
        assert_eq!(probe.state("review"), Some(StateId::new("submitted")));
        assert_eq!((probe.hits("a"), probe.hits("b"), probe.hits("c")), (1, 0, 0));
        assert!(sut.is_in_workflow(&probe));

        let probe = sut.start(probe).unwrap();
        assert_eq!(probe.state("review"), Some(StateId::new("reviewed")));
        assert_eq!((probe.hits("a"), probe.hits("b"), probe.hits("c")), (1, 1, 0));

        let probe = sut.start(probe).unwrap();
        assert_eq!(probe.state("review").as_ref(), Some(sut.end_state()));
        assert_eq!((probe.hits("a"), probe.hits("b"), probe.hits("c")), (1, 1, 1));
        assert!(!sut.is_in_workflow(&probe));
        assert_eq!(sut.has_been_in_workflow(&probe), Some(true));
    }

    #[test]
    fn test_finished_workflow_cannot_restart() {
        let sut = StatefulWorkflow::new("once").step(point("a")).unwrap();

        let probe = sut.start(Probe::default()).unwrap();
        let result = sut.start(probe.clone());

        assert!(matches!(result, Err(FlowError::IllegalTransition { .. })));
        assert_eq!(probe.hits("a"), 1);
    }

    #[test]
    fn test_unknown_stored_state_fails_without_writing() {
        let sut = StatefulWorkflow::new("review")
            .step(point("a"))
            .unwrap()
            .yield_at("submitted")
            .unwrap();

        let mut probe = Probe::default();
        probe.set_state_id(&WorkflowId::new("review"), StateId::new("archived"));

        let result = sut.start(probe.clone());

        assert!(matches!(
            result,
            Err(FlowError::IllegalTransition { from: Some(ref s), .. }) if s.as_str() == "archived"
        ));
        assert_eq!(probe.state("review"), Some(StateId::new("archived")));
        assert_eq!(probe.hits("a"), 0);
    }

    #[test]
    fn test_forbidden_transition_is_fatal() {
        let rule = DefaultTransitionRule::new("review").forbid(None, "submitted");
        let sut = StatefulWorkflow::new("review")
            .step(point("a"))
            .unwrap()
            .yield_at("submitted")
            .unwrap()
            .with_transition_rule(rule);

        let result = sut.start(Probe::default());
        assert!(matches!(result, Err(FlowError::IllegalTransition { .. })));
    }

    #[test]
    fn test_forbidden_segment_runs_no_steps() {
        let rule = DefaultTransitionRule::new("wf").forbid(None, "done");
        let sut = StatefulWorkflow::new("wf")
            .step(point("side effect"))
            .unwrap()
            .yield_at("done")
            .unwrap()
            .with_transition_rule(rule);

        let probe = Probe::default();
        for _ in 0..3 {
            let result = sut.start(probe.clone());
            assert!(matches!(
                result,
                Err(FlowError::IllegalTransition { to: Some(ref s), .. }) if s.as_str() == "done"
            ));
        }

        assert_eq!(probe.hits("side effect"), 0);
        assert!(probe.state("wf").is_none());
    }

    #[test]
    fn test_forbidden_later_segment_runs_no_steps() {
        let rule = DefaultTransitionRule::new("review").forbid(Some(StateId::new("submitted")), "reviewed");
        let sut = StatefulWorkflow::new("review")
            .step(point("a"))
            .unwrap()
            .yield_at("submitted")
            .unwrap()
            .step(point("b"))
            .unwrap()
            .yield_at("reviewed")
            .unwrap()
            .with_transition_rule(rule);

        let probe = sut.start(Probe::default()).unwrap();
        assert!(sut.start(probe.clone()).is_err());

        assert_eq!(probe.hits("a"), 1);
        assert_eq!(probe.hits("b"), 0);
        assert_eq!(probe.state("review"), Some(StateId::new("submitted")));
    }

    #[test]
    fn test_steps_before_entry_count_as_passed() {
        let checked = Declare::step();
        let sut = StatefulWorkflow::new("review")
            .declare(point("check"), &checked)
            .unwrap()
            .yield_at("checked")
            .unwrap()
            .step_if(point("after check"), Gate::passed(&checked))
            .unwrap();

        let probe = sut.start(Probe::default()).unwrap();
        assert_eq!(probe.hits("after check"), 0);

        let probe = sut.start(probe).unwrap();
        assert_eq!(probe.hits("check"), 1);
        assert_eq!(probe.hits("after check"), 1);
    }

    #[test]
    fn test_stored_state_must_be_a_yield() {
        let anchor = DeclaredStep::named("anchor");
        let sut = StatefulWorkflow::new("review")
            .declare(point("a"), &anchor)
            .unwrap()
            .step(point("b"))
            .unwrap()
            .yield_at("submitted")
            .unwrap();

        let mut probe = Probe::default();
        probe.set_state_id(sut.id(), StateId::new("anchor"));

        let result = sut.start(probe.clone());

        assert!(matches!(
            result,
            Err(FlowError::IllegalTransition { from: Some(ref s), .. }) if s.as_str() == "anchor"
        ));
        assert_eq!(probe.hits("b"), 0);
        assert_eq!(probe.state("review"), Some(StateId::new("anchor")));
    }

    #[test]
    fn test_fatal_failure_keeps_state() {
        let sut = StatefulWorkflow::new("review")
            .yield_at("submitted")
            .unwrap()
            .step(Operation::fallible(|_: Probe| -> Result<Probe, BoxError> { Err("rejected".into()) }))
            .unwrap()
            .strict();

        let probe = sut.start(Probe::default()).unwrap();
        let result = sut.start(probe.clone());

        assert!(matches!(result, Err(FlowError::Operation { .. })));
        assert_eq!(probe.state("review"), Some(StateId::new("submitted")));
    }

    #[test]
    fn test_tolerated_failure_still_moves_on() {
        let sut = StatefulWorkflow::new("review")
            .step(Operation::fallible(|_: Probe| -> Result<Probe, BoxError> { Err("flaky".into()) }))
            .unwrap()
            .yield_at("submitted")
            .unwrap();

        let probe = sut.start(Probe::default()).unwrap();
        assert_eq!(probe.state("review"), Some(StateId::new("submitted")));
    }

    #[test]
    fn test_closed_gate_is_idempotent_across_runs() {
        let sut = StatefulWorkflow::new("gated")
            .step_if(point("never"), Gate::is_true(false))
            .unwrap()
            .yield_at("waiting")
            .unwrap();

        for _ in 0..3 {
            let mut probe = Probe::default();
            probe = sut.start(probe).unwrap();
            assert_eq!(probe.hits("never"), 0);
            assert_eq!(probe.state("gated"), Some(StateId::new("waiting")));
        }
    }

    #[test]
    fn test_duplicate_yield_is_rejected() {
        let result = StatefulWorkflow::<Probe>::new("review")
            .yield_at("submitted")
            .and_then(|w| w.yield_at("submitted"));

        assert!(matches!(result, Err(FlowError::DuplicateDeclaration { .. })));
    }

    #[test]
    fn test_possible_transitions() {
        let sut = StatefulWorkflow::<Probe>::new("review")
            .yield_at("submitted")
            .unwrap()
            .yield_at("reviewed")
            .unwrap();

        let all = sut.possible_transitions();
        assert_eq!(
            all,
            vec![
                Transition::new(None, StateId::new("submitted")),
                Transition::new(Some(StateId::new("submitted")), StateId::new("reviewed")),
                Transition::new(Some(StateId::new("reviewed")), sut.end_state().clone()),
            ]
        );

        let mut probe = Probe::default();
        probe.set_state_id(sut.id(), StateId::new("submitted"));
        let open = sut.possible_transitions_for(&probe);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].to, StateId::new("reviewed"));
    }

    #[test]
    fn test_parameters_reach_segment() {
        let sut = StatefulWorkflow::new("params")
            .step(Operation::with_context(|p: Probe, ctx: &Context| {
                let point = if ctx.parameter("urgent").is_some() { "urgent" } else { "normal" };
                Ok(p.feedback(point))
            }))
            .unwrap()
            .yield_at("queued")
            .unwrap();

        let mut params = Parameters::new();
        params.insert("urgent".to_string(), serde_json::Value::Bool(true));

        let probe = sut.start_with_params(Probe::default(), params).unwrap();
        assert_eq!(probe.hits("urgent"), 1);
        assert_eq!(probe.hits("normal"), 0);
    }
}
