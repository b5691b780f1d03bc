use std::collections::BTreeMap;

use log::{info, warn};
use serde_json::Value;

use super::load_model::entities;
use crate::decision::{Decision, DecisionBunch, DecisionValue, choices_checksum};
use crate::error::TaskError;
use crate::playground::{State, Step, Task, TaskContext, Touches};

/// Assigns one class to every entity through a list decision over its
/// candidate classes.
///
/// Answers are stored per GUID and only reused while the candidate set is
/// unchanged.
#[derive(Debug, Default)]
pub struct Classify;

impl Task for Classify {
    fn name(&self) -> &'static str {
        "classify"
    }

    fn description(&self) -> &'static str {
        "Classify the model entities"
    }

    fn reads(&self) -> &'static [&'static str] {
        &["entities"]
    }

    fn touches(&self) -> Touches {
        Touches::Keys(&["classified"])
    }

    fn run(&mut self, inputs: State, ctx: &mut TaskContext) -> Result<Step, TaskError> {
        let mut bunch = DecisionBunch::new();
        for entity in entities(&inputs)? {
            if entity.candidates.is_empty() {
                warn!("No candidate class for '{}' ({})", entity.name, entity.guid);
                continue;
            }
            let checksum = choices_checksum(entity.candidates.iter().map(String::as_str));
            bunch.push(
                Decision::list(
                    format!("Class of '{}' ({})?", entity.name, entity.guid),
                    entity.candidates,
                )
                .key(entity.guid.as_str())
                .global_key(format!("{}_class", entity.guid))
                .validate_checksum(checksum)
                .allow_skip(true)
                .build(&ctx.registry)?,
            );
        }
        Ok(Step::Suspend(bunch))
    }

    fn resume(&mut self, bunch: DecisionBunch, _ctx: &mut TaskContext) -> Result<Step, TaskError> {
        let classified: BTreeMap<String, Value> = bunch
            .to_answer_dict()
            .into_iter()
            .filter_map(|(guid, value)| match value {
                DecisionValue::Choice(class) => Some((guid, Value::String(class))),
                _ => None,
            })
            .collect();
        let unclassified = bunch.len() - classified.len();
        if unclassified > 0 {
            warn!("{unclassified} entities left unclassified");
        }
        info!("Classified {} entities", classified.len());
        Ok(Step::Done(vec![serde_json::to_value(classified)?]))
    }
}
