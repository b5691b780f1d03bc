//! Versioned JSON store of previously answered decisions.
//!
//! ```text
//! { "version": "0.1", "checksum_ifc": null,
//!   "decisions": { "<global_key>": {"value": ..., "unit"?: "...", "checksum"?: "..."} } }
//! ```
//!
//! Older file versions are upgraded through a [`ConverterChain`]. A file that
//! can not be upgraded is ignored with a warning.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::decision::{Decision, DecisionBunch, DecisionRegistry, DecisionValue};
use crate::error::PersistenceError;
use crate::frontend::Frontend;

pub const DECISION_FILE_VERSION: &str = "0.1";

/// Files written before versioning carry no `version` field.
const LEGACY_VERSION: &str = "0";

/// Stored form of one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDecision {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl StoredDecision {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            unit: None,
            checksum: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_checksum(mut self, checksum: Option<String>) -> Self {
        self.checksum = checksum;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionFile {
    pub version: String,
    #[serde(default)]
    pub checksum_ifc: Option<String>,
    #[serde(default)]
    pub decisions: BTreeMap<String, StoredDecision>,
}

pub type ConvertFn = fn(Value) -> Result<Value, PersistenceError>;

/// Upgrades file data from one version to the next.
#[derive(Debug, Clone, Copy)]
pub struct Converter {
    pub from: &'static str,
    pub to: &'static str,
    pub convert: ConvertFn,
}

#[derive(Debug, Clone)]
pub struct ConverterChain {
    converters: Vec<Converter>,
}

impl Default for ConverterChain {
    fn default() -> Self {
        Self {
            converters: vec![Converter {
                from: LEGACY_VERSION,
                to: "0.1",
                convert: convert_0_to_0_1,
            }],
        }
    }
}

impl ConverterChain {
    pub fn empty() -> Self {
        Self {
            converters: Vec::new(),
        }
    }

    pub fn register(&mut self, converter: Converter) {
        self.converters.push(converter);
    }

    /// Applies converters until the data has the current version.
    pub fn upgrade(&self, mut data: Value) -> Result<Value, PersistenceError> {
        // Each converter is used at most once, which also rules out cycles.
        for _ in 0..=self.converters.len() {
            let version = file_version(&data);
            if version == DECISION_FILE_VERSION {
                return Ok(data);
            }
            let Some(converter) = self.converters.iter().find(|c| c.from == version) else {
                return Err(PersistenceError::Unconvertible { version });
            };
            debug!("converting decision file {} -> {}", converter.from, converter.to);
            data = (converter.convert)(data)?;
        }
        Err(PersistenceError::Unconvertible {
            version: file_version(&data),
        })
    }
}

fn file_version(data: &Value) -> String {
    data.get("version")
        .and_then(Value::as_str)
        .unwrap_or(LEGACY_VERSION)
        .to_string()
}

/// Legacy files stored bare values instead of `{"value": ...}` entries.
fn convert_0_to_0_1(mut data: Value) -> Result<Value, PersistenceError> {
    let decisions = data
        .get_mut("decisions")
        .and_then(Value::as_object_mut)
        .map(std::mem::take)
        .unwrap_or_default();
    let decisions: serde_json::Map<String, Value> = decisions
        .into_iter()
        .map(|(key, entry)| {
            let entry = match entry {
                Value::Object(map) if map.contains_key("value") => Value::Object(map),
                bare => serde_json::json!({ "value": bare }),
            };
            (key, entry)
        })
        .collect();
    let checksum_ifc = data.get("checksum_ifc").cloned().unwrap_or(Value::Null);
    Ok(serde_json::json!({
        "version": "0.1",
        "checksum_ifc": checksum_ifc,
        "decisions": decisions,
    }))
}

/// Whether previously made decisions are reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReusePolicy {
    /// Ask through the frontend.
    #[default]
    Ask,
    Always,
    Never,
}

/// A decision file on disk.
#[derive(Debug, Clone)]
pub struct DecisionStore {
    path: PathBuf,
    converters: ConverterChain,
    reuse: ReusePolicy,
}

impl DecisionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            converters: ConverterChain::default(),
            reuse: ReusePolicy::default(),
        }
    }

    pub fn with_reuse(mut self, reuse: ReusePolicy) -> Self {
        self.reuse = reuse;
        self
    }

    pub fn with_converters(mut self, converters: ConverterChain) -> Self {
        self.converters = converters;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and upgrades the file. `None` if there is no file or its version
    /// can not be converted.
    pub fn read(&self) -> Result<Option<DecisionFile>, PersistenceError> {
        if !self.path.exists() {
            debug!("no decision file at {}", self.path.display());
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let data: Value = serde_json::from_str(&content)?;
        let data = match self.converters.upgrade(data) {
            Ok(data) => data,
            Err(PersistenceError::Unconvertible { version }) => {
                warn!(
                    "Decision file {} has version {version} which can not be converted, ignoring it",
                    self.path.display()
                );
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        Ok(Some(serde_json::from_value(data)?))
    }

    /// Makes the stored answers available to new decisions in `registry`.
    ///
    /// Whether to reuse them is itself a decision, answered through
    /// `frontend` unless the reuse policy settles it. Returns the number of
    /// stored answers taken over.
    pub fn load(
        &self,
        registry: &DecisionRegistry,
        frontend: &mut dyn Frontend,
    ) -> Result<usize, PersistenceError> {
        let Some(file) = self.read()? else {
            return Ok(0);
        };
        let count = file.decisions.len();
        if count == 0 {
            return Ok(0);
        }
        if let (Some(stored), Some(current)) = (&file.checksum_ifc, registry.checksum_ifc())
            && *stored != current
        {
            warn!("The model changed since these decisions were saved");
        }

        let reuse = match self.reuse {
            ReusePolicy::Always => true,
            ReusePolicy::Never => false,
            ReusePolicy::Ask => {
                let mut question = Decision::bool(format!(
                    "Found {count} previously made decision(s). Do you want to reuse them?"
                ))
                .allow_save(false)
                .allow_load(false)
                .build(registry)?;
                question
                    .decide(frontend)?
                    .and_then(DecisionValue::as_bool)
                    .unwrap_or(false)
            }
        };
        if !reuse {
            info!("Not reusing {count} stored decision(s)");
            return Ok(0);
        }

        registry.replace_stored(file.decisions);
        info!("Loaded {count} stored decision(s) from {}", self.path.display());
        Ok(count)
    }

    /// Writes the stored answers of `registry` plus every savable decision
    /// in `decisions`, which move to `SavedDone`.
    pub fn save(
        &self,
        registry: &DecisionRegistry,
        decisions: &mut DecisionBunch,
    ) -> Result<usize, PersistenceError> {
        let mut entries = registry.stored_decisions();
        for decision in decisions.iter_mut() {
            if let Some((key, stored)) = decision.persist() {
                entries.insert(key, stored);
            }
        }
        let file = DecisionFile {
            version: DECISION_FILE_VERSION.to_string(),
            checksum_ifc: registry.checksum_ifc(),
            decisions: entries,
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        info!(
            "Saved {} decision(s) to {}",
            file.decisions.len(),
            self.path.display()
        );
        Ok(file.decisions.len())
    }

    /// Deletes the file. Returns whether there was one.
    pub fn clear(&self) -> Result<bool, PersistenceError> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)?;
        Ok(true)
    }
}

/// SHA-256 of a file, used as `checksum_ifc`.
pub fn file_checksum(path: &Path) -> Result<String, PersistenceError> {
    let bytes = fs::read(path)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{DecisionStatus, Quantity};
    use crate::frontend::ConsoleFrontend;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn console(input: &str) -> ConsoleFrontend<Cursor<Vec<u8>>, Vec<u8>> {
        ConsoleFrontend::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    fn store(dir: &TempDir) -> DecisionStore {
        DecisionStore::new(dir.path().join("decisions.json"))
    }

    #[test]
    fn real_decision_round_trip() {
        let dir = TempDir::new().unwrap();
        let registry = DecisionRegistry::new();
        let mut made: DecisionBunch = vec![
            Decision::real("U-value of walls?", "W/(m2K)")
                .global_key("u_value_wall")
                .validate_checksum("v1")
                .build(&registry)
                .unwrap(),
        ]
        .into();
        made[0]
            .set_value(DecisionValue::Real(Quantity::new(0.24, "W/(m2K)")))
            .unwrap();
        assert_eq!(store(&dir).save(&registry, &mut made).unwrap(), 1);
        assert_eq!(made[0].status(), DecisionStatus::SavedDone);
        drop(made);

        let raw: Value =
            serde_json::from_str(&fs::read_to_string(store(&dir).path()).unwrap()).unwrap();
        assert_eq!(raw["version"], "0.1");
        assert_eq!(raw["decisions"]["u_value_wall"]["value"], 0.24);
        assert_eq!(raw["decisions"]["u_value_wall"]["unit"], "W/(m2K)");
        assert_eq!(raw["decisions"]["u_value_wall"]["checksum"], "v1");

        let next_run = DecisionRegistry::new();
        assert_eq!(store(&dir).load(&next_run, &mut console("y\n")).unwrap(), 1);
        let reloaded = Decision::real("U-value of walls?", "W/(m2K)")
            .global_key("u_value_wall")
            .validate_checksum("v1")
            .build(&next_run)
            .unwrap();
        assert_eq!(reloaded.status(), DecisionStatus::LoadedDone);
        assert_eq!(
            reloaded.value(),
            Some(&DecisionValue::Real(Quantity::new(0.24, "W/(m2K)")))
        );
    }

    #[test]
    fn changed_checksum_leaves_decision_open() {
        let dir = TempDir::new().unwrap();
        let registry = DecisionRegistry::new();
        let mut made: DecisionBunch = vec![
            Decision::list("Class?", ["IfcWall", "IfcSlab"])
                .global_key("class_1")
                .validate_checksum("old")
                .build(&registry)
                .unwrap(),
        ]
        .into();
        made[0].set_value(DecisionValue::Choice("IfcWall".into())).unwrap();
        store(&dir).save(&registry, &mut made).unwrap();

        let next_run = DecisionRegistry::new();
        store(&dir)
            .with_reuse(ReusePolicy::Always)
            .load(&next_run, &mut console(""))
            .unwrap();
        let d = Decision::list("Class?", ["IfcWall", "IfcSlab", "IfcRoof"])
            .global_key("class_1")
            .validate_checksum("new")
            .build(&next_run)
            .unwrap();
        assert_eq!(d.status(), DecisionStatus::Open);
    }

    #[test]
    fn declined_reuse_keeps_registry_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(
            store(&dir).path(),
            r#"{"version": "0.1", "checksum_ifc": null, "decisions": {"heated": {"value": true}}}"#,
        )
        .unwrap();

        let registry = DecisionRegistry::new();
        assert_eq!(store(&dir).load(&registry, &mut console("n\n")).unwrap(), 0);
        assert!(registry.stored("heated").is_none());

        let never = store(&dir).with_reuse(ReusePolicy::Never);
        assert_eq!(never.load(&registry, &mut console("")).unwrap(), 0);
        // The reuse question itself holds no key.
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn legacy_file_is_converted() {
        let dir = TempDir::new().unwrap();
        fs::write(
            store(&dir).path(),
            r#"{"decisions": {"heated": true, "u": {"value": 0.3, "unit": "W/(m2K)"}}}"#,
        )
        .unwrap();

        let file = store(&dir).read().unwrap().unwrap();
        assert_eq!(file.version, DECISION_FILE_VERSION);
        assert_eq!(file.checksum_ifc, None);
        assert_eq!(file.decisions["heated"], StoredDecision::new(serde_json::json!(true)));
        assert_eq!(file.decisions["u"].unit.as_deref(), Some("W/(m2K)"));
    }

    #[test]
    fn unknown_version_is_ignored_without_error() {
        let dir = TempDir::new().unwrap();
        fs::write(
            store(&dir).path(),
            r#"{"version": "9.9", "decisions": {"heated": {"value": true}}}"#,
        )
        .unwrap();

        let registry = DecisionRegistry::new();
        assert!(store(&dir).read().unwrap().is_none());
        assert_eq!(store(&dir).load(&registry, &mut console("y\n")).unwrap(), 0);
        assert!(registry.stored_decisions().is_empty());

        let strict = store(&dir).with_converters(ConverterChain::empty());
        fs::write(strict.path(), r#"{"decisions": {}}"#).unwrap();
        assert!(strict.read().unwrap().is_none());
    }

    #[test]
    fn save_writes_only_answered_savable_decisions() {
        let dir = TempDir::new().unwrap();
        let registry = DecisionRegistry::new();
        registry.set_checksum_ifc(Some("model-hash".into()));
        let mut made: DecisionBunch = vec![
            Decision::bool("Answered?").global_key("answered").build(&registry).unwrap(),
            Decision::bool("Skipped?")
                .global_key("skipped")
                .allow_skip(true)
                .build(&registry)
                .unwrap(),
            Decision::bool("Open?").global_key("open").build(&registry).unwrap(),
            Decision::bool("Anonymous?").build(&registry).unwrap(),
        ]
        .into();
        made[0].set_value(DecisionValue::Bool(true)).unwrap();
        made[1].skip().unwrap();
        made[3].set_value(DecisionValue::Bool(true)).unwrap();

        assert_eq!(store(&dir).save(&registry, &mut made).unwrap(), 1);
        let file = store(&dir).read().unwrap().unwrap();
        assert_eq!(file.checksum_ifc.as_deref(), Some("model-hash"));
        assert_eq!(file.decisions.keys().collect::<Vec<_>>(), vec!["answered"]);
    }

    #[test]
    fn save_keeps_previously_stored_answers() {
        let dir = TempDir::new().unwrap();
        let registry = DecisionRegistry::new();
        registry.replace_stored(BTreeMap::from([(
            "earlier".to_string(),
            StoredDecision::new(serde_json::json!("IfcWall")),
        )]));
        store(&dir).save(&registry, &mut DecisionBunch::new()).unwrap();
        let file = store(&dir).read().unwrap().unwrap();
        assert!(file.decisions.contains_key("earlier"));

        assert!(store(&dir).clear().unwrap());
        assert!(!store(&dir).clear().unwrap());
    }

    #[test]
    fn file_checksum_is_sha256() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.ifc");
        fs::write(&path, b"ISO-10303-21;").unwrap();
        let a = file_checksum(&path).unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, file_checksum(&path).unwrap());
    }
}
