//! Cooperative scheduler for pipeline tasks.
//!
//! A task runs in steps. Each step either finishes with the task's results
//! or suspends with a [`DecisionBunch`] that the playground solves through a
//! [`Frontend`] before resuming the task with the answered bunch.

use std::any::TypeId;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::decision::{
    Decision, DecisionBuilder, DecisionBunch, DecisionRegistry, DecisionValue, ListKind,
};
use crate::error::{DecisionError, PlaygroundError, TaskError};
use crate::frontend::Frontend;

/// Shared blackboard tasks read from and write to.
pub type State = BTreeMap<String, Value>;

/// Builds a fresh task instance.
pub type TaskFactory = fn() -> Box<dyn Task>;

pub fn factory<T: Task + Default>() -> Box<dyn Task> {
    Box::new(T::default())
}

/// What a task writes back when it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Touches {
    /// One state entry per key, in result order.
    Keys(&'static [&'static str]),
    /// Clears state and history instead of producing outputs.
    Reset,
}

#[derive(Debug)]
pub enum Step {
    Suspend(DecisionBunch),
    Done(Vec<Value>),
}

/// Run-scoped resources handed to every task step.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub registry: DecisionRegistry,
    pub project_dir: PathBuf,
    pub model_file: Option<PathBuf>,
}

pub trait Task: 'static {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    /// State keys that must exist before the task can run.
    fn reads(&self) -> &'static [&'static str] {
        &[]
    }

    fn touches(&self) -> Touches;

    /// The pipeline is finished once a final task completed.
    fn is_final(&self) -> bool {
        false
    }

    fn single_use(&self) -> bool {
        true
    }

    fn kind(&self) -> TypeId {
        TypeId::of::<Self>()
    }

    fn requirements_met(&self, state: &State, history: &[TaskRecord]) -> bool {
        let fresh = !self.single_use() || history.iter().all(|record| record.kind != self.kind());
        fresh && self.reads().iter().all(|key| state.contains_key(*key))
    }

    /// First step. `inputs` holds the state entries named by [`Task::reads`].
    fn run(&mut self, inputs: State, ctx: &mut TaskContext) -> Result<Step, TaskError>;

    /// Continues after the bunch of the previous [`Step::Suspend`] was solved.
    fn resume(&mut self, _bunch: DecisionBunch, _ctx: &mut TaskContext) -> Result<Step, TaskError> {
        Err(TaskError::UnexpectedResume)
    }

    /// Called instead of [`Task::resume`] when solving the bunch was canceled.
    fn on_cancel(
        &mut self,
        _bunch: DecisionBunch,
        _ctx: &mut TaskContext,
    ) -> Result<Step, TaskError> {
        Err(TaskError::Canceled)
    }
}

/// One completed task in the playground history.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    /// Decisions the task raised.
    pub decisions: usize,
    #[serde(skip)]
    kind: TypeId,
}

impl TaskRecord {
    pub fn kind(&self) -> TypeId {
        self.kind
    }
}

pub struct Playground {
    state: State,
    history: Vec<TaskRecord>,
    made_decisions: DecisionBunch,
    registry: DecisionRegistry,
    tasks: Vec<TaskFactory>,
    ctx: TaskContext,
    finished: bool,
}

impl Playground {
    pub fn new(
        registry: DecisionRegistry,
        tasks: Vec<TaskFactory>,
        project_dir: impl Into<PathBuf>,
    ) -> Self {
        let ctx = TaskContext {
            registry: registry.clone(),
            project_dir: project_dir.into(),
            model_file: None,
        };
        Self {
            state: State::new(),
            history: Vec::new(),
            made_decisions: DecisionBunch::new(),
            registry,
            tasks,
            ctx,
            finished: false,
        }
    }

    pub fn with_model_file(mut self, model_file: impl Into<PathBuf>) -> Self {
        self.ctx.model_file = Some(model_file.into());
        self
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn history(&self) -> &[TaskRecord] {
        &self.history
    }

    /// Copies of every decision raised so far, in the order they were solved.
    pub fn made_decisions(&self) -> &DecisionBunch {
        &self.made_decisions
    }

    pub fn made_decisions_mut(&mut self) -> &mut DecisionBunch {
        &mut self.made_decisions
    }

    pub fn registry(&self) -> &DecisionRegistry {
        &self.registry
    }

    pub fn project_dir(&self) -> &Path {
        &self.ctx.project_dir
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn known_tasks(&self) -> Vec<Box<dyn Task>> {
        self.tasks.iter().map(|factory| factory()).collect()
    }

    /// Tasks whose requirements are met by the current state and history.
    pub fn available_tasks(&self) -> Vec<Box<dyn Task>> {
        self.known_tasks()
            .into_iter()
            .filter(|task| task.requirements_met(&self.state, &self.history))
            .collect()
    }

    pub fn task_by_name(&self, name: &str) -> Result<Box<dyn Task>, PlaygroundError> {
        self.known_tasks()
            .into_iter()
            .find(|task| task.name() == name)
            .ok_or_else(|| PlaygroundError::UnknownTask(name.to_string()))
    }

    /// Runs `task` to completion, solving every bunch it suspends with.
    pub fn run_task(
        &mut self,
        mut task: Box<dyn Task>,
        frontend: &mut dyn Frontend,
    ) -> Result<(), PlaygroundError> {
        let name = task.name();
        if !task.requirements_met(&self.state, &self.history) {
            return Err(PlaygroundError::RequirementsNotMet(name.to_string()));
        }
        let inputs: State = task
            .reads()
            .iter()
            .filter_map(|key| self.state.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect();

        info!("Running task {name}");
        let started_at = Utc::now();
        let mut raised = 0;
        let mut step = task
            .run(inputs, &mut self.ctx)
            .map_err(|err| task_error(name, err))?;

        let results = loop {
            let mut bunch = match step {
                Step::Done(results) => break results,
                Step::Suspend(bunch) => bunch,
            };
            debug!("{name} suspended with {} decision(s)", bunch.len());
            let outcome = bunch.decide_collected(frontend);
            raised += bunch.len();
            self.made_decisions
                .extend(bunch.iter().map(Decision::detached));

            let next = match outcome {
                Ok(()) => task.resume(bunch, &mut self.ctx),
                Err(DecisionError::Canceled) => task.on_cancel(bunch, &mut self.ctx),
                Err(err) => Err(err.into()),
            };
            step = next.map_err(|err| task_error(name, err))?;
        };

        match task.touches() {
            Touches::Reset => {
                info!("Resetting state and history");
                self.state.clear();
                self.history.clear();
                self.finished = false;
                return Ok(());
            }
            Touches::Keys(keys) => {
                if results.len() != keys.len() {
                    return Err(task_error(
                        name,
                        TaskError::ResultArity {
                            expected: keys.len(),
                            got: results.len(),
                        },
                    ));
                }
                for (key, value) in keys.iter().zip(results) {
                    self.state.insert(key.to_string(), value);
                }
            }
        }

        let finished_at = Utc::now();
        self.history.push(TaskRecord {
            name: name.to_string(),
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds(),
            decisions: raised,
            kind: task.kind(),
        });
        if task.is_final() {
            info!("Final task {name} completed");
            self.finished = true;
        }
        Ok(())
    }

    /// Runs the named tasks in order.
    pub fn run_sequence<S: AsRef<str>>(
        &mut self,
        names: &[S],
        frontend: &mut dyn Frontend,
    ) -> Result<(), PlaygroundError> {
        for name in names {
            if self.finished {
                warn!("Pipeline already finished, running {} anyway", name.as_ref());
            }
            let task = self.task_by_name(name.as_ref())?;
            self.run_task(task, frontend)?;
        }
        Ok(())
    }

    /// Lets the user pick the next ready task until a final task completed
    /// or nothing is ready.
    pub fn run_interactive(&mut self, frontend: &mut dyn Frontend) -> Result<(), PlaygroundError> {
        while !self.finished {
            let mut available = self.available_tasks();
            if available.is_empty() {
                info!("No task is ready to run");
                break;
            }
            let choices = ListKind::with_labels(
                available
                    .iter()
                    .map(|task| match task.description() {
                        "" => (task.name(), task.name()),
                        description => (task.name(), description),
                    }),
            );
            let picked = {
                let mut next = DecisionBuilder::new("Which task should run next?", choices)
                    .allow_load(false)
                    .allow_save(false)
                    .build(&self.registry)?;
                // A single ready task is picked without asking.
                if next.is_open() {
                    next.decide(frontend)?;
                }
                next.value()
                    .and_then(DecisionValue::as_str)
                    .map(str::to_string)
            };
            let Some(picked) = picked else {
                break;
            };
            let index = available
                .iter()
                .position(|task| task.name() == picked)
                .ok_or_else(|| PlaygroundError::UnknownTask(picked.clone()))?;
            let task = available.swap_remove(index);
            self.run_task(task, frontend)?;
        }
        Ok(())
    }
}

fn task_error(task: &str, err: TaskError) -> PlaygroundError {
    match err {
        TaskError::Canceled | TaskError::Decision(DecisionError::Canceled) => {
            error!("Task {task} was canceled");
            PlaygroundError::Canceled {
                task: task.to_string(),
            }
        }
        source => {
            error!("Task {task} failed: {source}");
            PlaygroundError::TaskFailed {
                task: task.to_string(),
                source,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionStatus;
    use crate::frontend::{CollectionOutcome, ConsoleFrontend};
    use serde_json::json;
    use std::io::Cursor;

    /// Answers every open bool decision, or ends with a fixed outcome.
    struct Scripted(CollectionOutcome);

    impl Frontend for Scripted {
        fn solve_collection(&mut self, decisions: &mut [Decision]) -> CollectionOutcome {
            if self.0 == CollectionOutcome::Completed {
                for d in decisions.iter_mut().filter(|d| d.is_open()) {
                    d.set_value(DecisionValue::Bool(true)).unwrap();
                }
            }
            self.0
        }
    }

    fn answer() -> Scripted {
        Scripted(CollectionOutcome::Completed)
    }

    #[derive(Default)]
    struct Produce;

    impl Task for Produce {
        fn name(&self) -> &'static str {
            "produce"
        }

        fn touches(&self) -> Touches {
            Touches::Keys(&["a", "b"])
        }

        fn run(&mut self, _inputs: State, _ctx: &mut TaskContext) -> Result<Step, TaskError> {
            Ok(Step::Done(vec![json!(1), json!(2)]))
        }
    }

    #[derive(Default)]
    struct ProduceOne;

    impl Task for ProduceOne {
        fn name(&self) -> &'static str {
            "produce_one"
        }

        fn touches(&self) -> Touches {
            Touches::Keys(&["a", "b"])
        }

        fn run(&mut self, _inputs: State, _ctx: &mut TaskContext) -> Result<Step, TaskError> {
            Ok(Step::Done(vec![json!(1)]))
        }
    }

    /// Asks whether `a` should be doubled.
    #[derive(Default)]
    struct Ask {
        a: i64,
    }

    impl Task for Ask {
        fn name(&self) -> &'static str {
            "ask"
        }

        fn reads(&self) -> &'static [&'static str] {
            &["a"]
        }

        fn touches(&self) -> Touches {
            Touches::Keys(&["c"])
        }

        fn is_final(&self) -> bool {
            true
        }

        fn run(&mut self, inputs: State, ctx: &mut TaskContext) -> Result<Step, TaskError> {
            self.a = inputs
                .get("a")
                .and_then(Value::as_i64)
                .ok_or_else(|| TaskError::MissingInput("a".into()))?;
            let bunch = vec![
                Decision::bool("Double a?")
                    .key("double")
                    .global_key("double_a")
                    .build(&ctx.registry)?,
            ];
            Ok(Step::Suspend(bunch.into()))
        }

        fn resume(&mut self, bunch: DecisionBunch, _ctx: &mut TaskContext) -> Result<Step, TaskError> {
            let double = bunch[0].require_value()?.as_bool().unwrap_or(false);
            let c = if double { self.a * 2 } else { self.a };
            Ok(Step::Done(vec![json!(c)]))
        }
    }

    /// Falls back to a default when its question is canceled.
    #[derive(Default)]
    struct Lenient;

    impl Task for Lenient {
        fn name(&self) -> &'static str {
            "lenient"
        }

        fn touches(&self) -> Touches {
            Touches::Keys(&["answer"])
        }

        fn run(&mut self, _inputs: State, ctx: &mut TaskContext) -> Result<Step, TaskError> {
            let bunch = vec![Decision::bool("Anything?").build(&ctx.registry)?];
            Ok(Step::Suspend(bunch.into()))
        }

        fn on_cancel(&mut self, _bunch: DecisionBunch, _ctx: &mut TaskContext) -> Result<Step, TaskError> {
            Ok(Step::Done(vec![Value::Null]))
        }
    }

    #[derive(Default)]
    struct Reset;

    impl Task for Reset {
        fn name(&self) -> &'static str {
            "reset"
        }

        fn touches(&self) -> Touches {
            Touches::Reset
        }

        fn single_use(&self) -> bool {
            false
        }

        fn run(&mut self, _inputs: State, _ctx: &mut TaskContext) -> Result<Step, TaskError> {
            Ok(Step::Done(Vec::new()))
        }
    }

    fn playground() -> Playground {
        let tasks: Vec<TaskFactory> = vec![
            factory::<Produce>,
            factory::<ProduceOne>,
            factory::<Ask>,
            factory::<Lenient>,
            factory::<Reset>,
        ];
        Playground::new(DecisionRegistry::new(), tasks, ".")
    }

    fn names(tasks: &[Box<dyn Task>]) -> Vec<&'static str> {
        tasks.iter().map(|t| t.name()).collect()
    }

    #[test]
    fn single_use_task_is_not_offered_twice() {
        let mut pg = playground();
        assert!(names(&pg.available_tasks()).contains(&"produce"));
        assert!(!names(&pg.available_tasks()).contains(&"ask"));

        pg.run_task(Box::new(Produce), &mut answer()).unwrap();
        assert_eq!(pg.state()["a"], json!(1));
        assert_eq!(pg.state()["b"], json!(2));

        let available = names(&pg.available_tasks());
        assert!(!available.contains(&"produce"));
        assert!(available.contains(&"ask"));
        assert!(available.contains(&"reset"));
        assert!(!Produce.requirements_met(pg.state(), pg.history()));
        assert!(matches!(
            pg.run_task(Box::new(Produce), &mut answer()),
            Err(PlaygroundError::RequirementsNotMet(_))
        ));
    }

    #[test]
    fn result_arity_mismatch_fails_the_task() {
        let mut pg = playground();
        let err = pg.run_task(Box::new(ProduceOne), &mut answer()).unwrap_err();
        assert!(matches!(
            err,
            PlaygroundError::TaskFailed {
                source: TaskError::ResultArity { expected: 2, got: 1 },
                ..
            }
        ));
        assert!(pg.state().is_empty());
        assert!(pg.history().is_empty());
    }

    #[test]
    fn suspended_task_resumes_with_answers() {
        let mut pg = playground();
        pg.run_sequence(&["produce", "ask"], &mut answer()).unwrap();

        assert_eq!(pg.state()["c"], json!(2));
        assert_eq!(pg.history().len(), 2);
        assert_eq!(pg.history()[1].decisions, 1);
        assert!(pg.is_finished());

        let made = pg.made_decisions();
        assert_eq!(made.len(), 1);
        assert_eq!(made[0].status(), DecisionStatus::Done);
        // The audit copy does not hold the key.
        assert!(!pg.registry().is_active("double_a"));
    }

    #[test]
    fn cancel_aborts_the_run() {
        let mut pg = playground();
        pg.run_task(Box::new(Produce), &mut answer()).unwrap();
        let err = pg
            .run_task(Box::new(Ask::default()), &mut Scripted(CollectionOutcome::Canceled))
            .unwrap_err();
        assert!(matches!(err, PlaygroundError::Canceled { task } if task == "ask"));
        assert!(!pg.state().contains_key("c"));
        assert_eq!(pg.history().len(), 1);
    }

    #[test]
    fn task_may_handle_cancel_itself() {
        let mut pg = playground();
        pg.run_task(Box::new(Lenient), &mut Scripted(CollectionOutcome::Canceled))
            .unwrap();
        assert_eq!(pg.state()["answer"], Value::Null);
        assert_eq!(pg.history().len(), 1);
    }

    #[test]
    fn reset_clears_state_and_history() {
        let mut pg = playground();
        pg.run_sequence(&["produce", "ask"], &mut answer()).unwrap();
        pg.run_sequence(&["reset"], &mut answer()).unwrap();

        assert!(pg.state().is_empty());
        assert!(pg.history().is_empty());
        assert!(!pg.is_finished());
        assert_eq!(pg.made_decisions().len(), 1);
        assert!(names(&pg.available_tasks()).contains(&"produce"));
    }

    #[test]
    fn unknown_task_name() {
        let mut pg = playground();
        assert!(matches!(
            pg.run_sequence(&["nope"], &mut answer()),
            Err(PlaygroundError::UnknownTask(name)) if name == "nope"
        ));
    }

    #[test]
    fn resume_without_suspend_is_an_error() {
        let mut ctx = TaskContext {
            registry: DecisionRegistry::new(),
            project_dir: PathBuf::from("."),
            model_file: None,
        };
        assert!(matches!(
            Produce.resume(DecisionBunch::new(), &mut ctx),
            Err(TaskError::UnexpectedResume)
        ));
    }

    #[test]
    fn interactive_run_stops_after_final_task() {
        let tasks: Vec<TaskFactory> = vec![factory::<Produce>, factory::<Ask>];
        let mut pg = Playground::new(DecisionRegistry::new(), tasks, ".");
        // Each step has one ready task, so the selection answers itself.
        let mut console = ConsoleFrontend::new(Cursor::new(b"n\n".to_vec()), Vec::new());
        pg.run_interactive(&mut console).unwrap();

        assert!(pg.is_finished());
        assert_eq!(pg.state()["c"], json!(1));
        let order: Vec<_> = pg.history().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(order, vec!["produce", "ask"]);
    }
}
