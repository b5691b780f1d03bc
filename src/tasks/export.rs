use std::collections::BTreeSet;
use std::fs;

use log::info;
use serde_json::{Value, json};

use super::load_model::{Entity, entities};
use crate::decision::{Decision, DecisionBunch, DecisionValue};
use crate::error::TaskError;
use crate::playground::{State, Step, Task, TaskContext, Touches};

pub const EXPORT_FILE: &str = "export.json";

/// Writes the simulation input summary into the project directory.
#[derive(Debug, Default)]
pub struct ExportSummary {
    inputs: State,
}

impl ExportSummary {
    fn write(&self, excluded: &BTreeSet<String>, ctx: &TaskContext) -> Result<Step, TaskError> {
        let classified = self
            .inputs
            .get("classified")
            .and_then(Value::as_object)
            .ok_or_else(|| TaskError::MissingInput("classified".into()))?;
        let elements: Vec<Value> = entities(&self.inputs)?
            .into_iter()
            .filter(|e| !excluded.contains(&e.guid))
            .map(|e| {
                json!({
                    "guid": e.guid,
                    "name": e.name,
                    "class": classified.get(&e.guid).cloned().unwrap_or(Value::Null),
                })
            })
            .collect();
        let summary = json!({
            "model": ctx.model_file.as_ref().map(|p| p.display().to_string()),
            "checksum_ifc": ctx.registry.checksum_ifc(),
            "elements": elements,
            "parameters": self.inputs.get("parameters").cloned().unwrap_or(Value::Null),
        });

        fs::create_dir_all(&ctx.project_dir)?;
        let path = ctx.project_dir.join(EXPORT_FILE);
        fs::write(&path, serde_json::to_string_pretty(&summary)?)?;
        info!("Exported {} element(s) to {}", elements.len(), path.display());
        Ok(Step::Done(vec![json!(path.display().to_string())]))
    }
}

impl Task for ExportSummary {
    fn name(&self) -> &'static str {
        "export_summary"
    }

    fn description(&self) -> &'static str {
        "Export the simulation input summary"
    }

    fn reads(&self) -> &'static [&'static str] {
        &["entities", "classified", "parameters"]
    }

    fn touches(&self) -> Touches {
        Touches::Keys(&["export"])
    }

    fn is_final(&self) -> bool {
        true
    }

    fn run(&mut self, inputs: State, ctx: &mut TaskContext) -> Result<Step, TaskError> {
        let known: BTreeSet<String> = entities(&inputs)?.into_iter().map(|e: Entity| e.guid).collect();
        self.inputs = inputs;
        let exclude = Decision::guid("GUIDs of elements to leave out of the export?", true)
            .key("excluded")
            .allow_skip(true)
            .allow_save(false)
            .validator(move |value| match value {
                DecisionValue::Guids(guids) => Ok(guids.is_subset(&known)),
                _ => Ok(false),
            })
            .build(&ctx.registry)?;
        Ok(Step::Suspend(DecisionBunch::from(vec![exclude])))
    }

    fn resume(&mut self, bunch: DecisionBunch, ctx: &mut TaskContext) -> Result<Step, TaskError> {
        let excluded = match bunch.to_answer_dict().remove("excluded") {
            Some(DecisionValue::Guids(guids)) => guids,
            _ => BTreeSet::new(),
        };
        self.write(&excluded, ctx)
    }
}
