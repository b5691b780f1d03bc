use log::info;

use crate::error::TaskError;
use crate::playground::{State, Step, Task, TaskContext, Touches};

/// Starts the pipeline over. Stored decisions are kept.
#[derive(Debug, Default)]
pub struct ResetProject;

impl Task for ResetProject {
    fn name(&self) -> &'static str {
        "reset_project"
    }

    fn description(&self) -> &'static str {
        "Reset state and history"
    }

    fn touches(&self) -> Touches {
        Touches::Reset
    }

    fn single_use(&self) -> bool {
        false
    }

    fn run(&mut self, _inputs: State, ctx: &mut TaskContext) -> Result<Step, TaskError> {
        info!("Resetting project {}", ctx.project_dir.display());
        Ok(Step::Done(Vec::new()))
    }
}
