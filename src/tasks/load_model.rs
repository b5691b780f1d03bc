use std::fs;
use std::path::PathBuf;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::decision::{Decision, DecisionBunch, DecisionValue, GuidKind};
use crate::error::TaskError;
use crate::persistence::file_checksum;
use crate::playground::{State, Step, Task, TaskContext, Touches};

/// A building element as delivered by the model reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub guid: String,
    pub name: String,
    /// Classes the element may belong to.
    #[serde(default)]
    pub candidates: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ModelFile {
    entities: Vec<Entity>,
}

/// Reads the entities of the building model.
///
/// The model path comes from the run context. Without one the user is asked
/// for it.
#[derive(Debug, Default)]
pub struct LoadModel;

impl LoadModel {
    fn load(&self, path: PathBuf, ctx: &mut TaskContext) -> Result<Step, TaskError> {
        let content = fs::read_to_string(&path)?;
        let model: ModelFile = serde_json::from_str(&content)?;
        if let Some(bad) = model
            .entities
            .iter()
            .find(|e| !GuidKind::is_valid_guid(&e.guid))
        {
            return Err(TaskError::Invalid(format!(
                "entity '{}' has an invalid GUID '{}'",
                bad.name, bad.guid
            )));
        }
        if model.entities.is_empty() {
            warn!("Model {} contains no entities", path.display());
        }

        if ctx.registry.checksum_ifc().is_none() {
            ctx.registry.set_checksum_ifc(Some(file_checksum(&path).map_err(|e| {
                TaskError::Invalid(format!("could not hash {}: {e}", path.display()))
            })?));
        }
        info!(
            "Loaded {} entities from {}",
            model.entities.len(),
            path.display()
        );
        ctx.model_file = Some(path);
        Ok(Step::Done(vec![serde_json::to_value(&model.entities)?]))
    }
}

impl Task for LoadModel {
    fn name(&self) -> &'static str {
        "load_model"
    }

    fn description(&self) -> &'static str {
        "Load the building model"
    }

    fn touches(&self) -> Touches {
        Touches::Keys(&["entities"])
    }

    fn run(&mut self, _inputs: State, ctx: &mut TaskContext) -> Result<Step, TaskError> {
        if let Some(path) = ctx.model_file.clone() {
            return self.load(path, ctx);
        }
        let project_dir = ctx.project_dir.clone();
        let question = Decision::text("Path of the model file?")
            .key("model_file")
            .allow_save(false)
            .validator(move |value| {
                let path = value.as_str().unwrap_or_default();
                Ok(project_dir.join(path).is_file())
            })
            .build(&ctx.registry)?;
        Ok(Step::Suspend(DecisionBunch::from(vec![question])))
    }

    fn resume(&mut self, bunch: DecisionBunch, ctx: &mut TaskContext) -> Result<Step, TaskError> {
        let answers = bunch.to_answer_dict();
        let path = answers
            .get("model_file")
            .and_then(DecisionValue::as_str)
            .ok_or_else(|| TaskError::MissingInput("model_file".into()))?;
        let path = ctx.project_dir.join(path);
        self.load(path, ctx)
    }
}

pub(crate) fn entities(inputs: &State) -> Result<Vec<Entity>, TaskError> {
    let value = inputs
        .get("entities")
        .cloned()
        .ok_or_else(|| TaskError::MissingInput("entities".into()))?;
    Ok(serde_json::from_value::<Vec<Entity>>(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionRegistry;
    use tempfile::TempDir;

    fn ctx(dir: &TempDir, model_file: Option<PathBuf>) -> TaskContext {
        TaskContext {
            registry: DecisionRegistry::new(),
            project_dir: dir.path().to_path_buf(),
            model_file,
        }
    }

    #[test]
    fn reads_entities_and_hashes_model() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        fs::write(
            &path,
            r#"{"entities": [{"guid": "2O2Fr$t4X7Zf8NOew3FLOH", "name": "Wall-001", "candidates": ["IfcWall"]}]}"#,
        )
        .unwrap();
        let mut ctx = ctx(&dir, Some(path));

        let Step::Done(results) = LoadModel.run(State::new(), &mut ctx).unwrap() else {
            panic!("expected results");
        };
        let loaded: Vec<Entity> = serde_json::from_value(results[0].clone()).unwrap();
        assert_eq!(loaded[0].name, "Wall-001");
        assert_eq!(ctx.registry.checksum_ifc().map(|c| c.len()), Some(64));
    }

    #[test]
    fn rejects_invalid_guid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, r#"{"entities": [{"guid": "nope", "name": "Wall"}]}"#).unwrap();
        let err = LoadModel.run(State::new(), &mut ctx(&dir, Some(path))).unwrap_err();
        assert!(matches!(err, TaskError::Invalid(msg) if msg.contains("nope")));
    }

    #[test]
    fn asks_for_path_without_model_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("model.json"), r#"{"entities": []}"#).unwrap();
        let mut ctx = ctx(&dir, None);

        let Step::Suspend(mut bunch) = LoadModel.run(State::new(), &mut ctx).unwrap() else {
            panic!("expected a question");
        };
        assert!(!bunch[0].validate(&DecisionValue::Text("missing.json".into())));
        bunch[0]
            .set_value(DecisionValue::Text("model.json".into()))
            .unwrap();

        let Step::Done(results) = LoadModel.resume(bunch, &mut ctx).unwrap() else {
            panic!("expected results");
        };
        assert_eq!(results[0], serde_json::json!([]));
        assert_eq!(ctx.model_file, Some(dir.path().join("model.json")));
    }
}
