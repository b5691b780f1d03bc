use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::kind::{BoolKind, DecisionKind, GuidKind, ListKind, RealKind, TextKind};
use super::registry::{DecisionRegistry, Registration};
use super::value::DecisionValue;
use crate::error::DecisionError;
use crate::frontend::{CollectionOutcome, Frontend};
use crate::persistence::StoredDecision;

/// Lifecycle of a decision.
///
/// `Open` → `Done` (answered), `Skipped` (bypassed) or `LoadedDone` (taken
/// from a previous run). Answered decisions may be persisted (`SavedDone`).
/// `reset` brings any state back to `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    Open,
    Done,
    LoadedDone,
    SavedDone,
    Skipped,
}

impl DecisionStatus {
    /// Holds a value that may be used by a task.
    pub fn is_answered(self) -> bool {
        matches!(
            self,
            DecisionStatus::Done | DecisionStatus::LoadedDone | DecisionStatus::SavedDone
        )
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionStatus::Open => write!(f, "open"),
            DecisionStatus::Done => write!(f, "done"),
            DecisionStatus::LoadedDone => write!(f, "loadeddone"),
            DecisionStatus::SavedDone => write!(f, "saveddone"),
            DecisionStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Extra predicate on top of the kind's own check. An `Err` counts as a
/// failed validation.
pub type Validator = dyn Fn(&DecisionValue) -> anyhow::Result<bool>;

/// Shared map that collecting decisions write their answer into.
pub type AnswerSink = Rc<RefCell<BTreeMap<String, DecisionValue>>>;

pub fn answer_sink() -> AnswerSink {
    Rc::new(RefCell::new(BTreeMap::new()))
}

/// A single question with a validated answer.
pub struct Decision {
    question: String,
    kind: Rc<dyn DecisionKind>,
    value: Option<DecisionValue>,
    status: DecisionStatus,
    key: Option<String>,
    global_key: Option<String>,
    output: Option<AnswerSink>,
    output_key: Option<String>,
    allow_skip: bool,
    allow_load: bool,
    allow_save: bool,
    collect: bool,
    validate_checksum: Option<String>,
    validator: Option<Rc<Validator>>,
    registration: Option<Rc<Registration>>,
}

impl fmt::Debug for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decision")
            .field("question", &self.question)
            .field("kind", &self.kind.name())
            .field("status", &self.status)
            .field("value", &self.value)
            .field("key", &self.key)
            .field("global_key", &self.global_key)
            .finish_non_exhaustive()
    }
}

impl Decision {
    pub fn bool(question: impl Into<String>) -> DecisionBuilder {
        DecisionBuilder::new(question, BoolKind)
    }

    pub fn real(question: impl Into<String>, unit: impl Into<String>) -> DecisionBuilder {
        DecisionBuilder::new(question, RealKind::new(unit))
    }

    pub fn list<I, S>(question: impl Into<String>, choices: I) -> DecisionBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DecisionBuilder::new(question, ListKind::new(choices))
    }

    pub fn text(question: impl Into<String>) -> DecisionBuilder {
        DecisionBuilder::new(question, TextKind)
    }

    pub fn guid(question: impl Into<String>, multiple: bool) -> DecisionBuilder {
        DecisionBuilder::new(question, GuidKind { multiple })
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn kind(&self) -> &dyn DecisionKind {
        self.kind.as_ref()
    }

    pub fn value(&self) -> Option<&DecisionValue> {
        self.value.as_ref()
    }

    pub fn status(&self) -> DecisionStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == DecisionStatus::Open
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn global_key(&self) -> Option<&str> {
        self.global_key.as_deref()
    }

    pub fn output_key(&self) -> Option<&str> {
        self.output_key.as_deref()
    }

    pub fn allow_skip(&self) -> bool {
        self.allow_skip
    }

    pub fn allow_load(&self) -> bool {
        self.allow_load
    }

    pub fn allow_save(&self) -> bool {
        self.allow_save
    }

    pub fn collect(&self) -> bool {
        self.collect
    }

    pub fn validate_checksum(&self) -> Option<&str> {
        self.validate_checksum.as_deref()
    }

    /// The answer, or [`DecisionError::Pending`] if there is none yet.
    pub fn require_value(&self) -> Result<&DecisionValue, DecisionError> {
        match (&self.value, self.status.is_answered()) {
            (Some(value), true) => Ok(value),
            _ => Err(DecisionError::Pending(self.question.clone())),
        }
    }

    /// Kind check and external predicate. Both must pass.
    pub fn validate(&self, value: &DecisionValue) -> bool {
        if !self.kind.check(value) {
            return false;
        }
        match &self.validator {
            None => true,
            Some(predicate) => predicate(value).unwrap_or_else(|err| {
                debug!("validator of '{}' failed: {err}", self.question);
                false
            }),
        }
    }

    pub fn set_value(&mut self, value: DecisionValue) -> Result<(), DecisionError> {
        if !self.is_open() {
            return Err(self.not_open());
        }
        if !self.validate(&value) {
            return Err(DecisionError::InvalidValue {
                question: self.question.clone(),
                value: value.to_string(),
            });
        }
        self.value = Some(value);
        self.status = DecisionStatus::Done;
        self.write_output();
        Ok(())
    }

    pub fn skip(&mut self) -> Result<(), DecisionError> {
        if !self.is_open() {
            return Err(self.not_open());
        }
        if !self.allow_skip {
            return Err(DecisionError::SkipNotAllowed(self.question.clone()));
        }
        self.value = None;
        self.status = DecisionStatus::Skipped;
        Ok(())
    }

    /// Back to `Open`, dropping the value and any stored copy of it.
    pub fn reset(&mut self) {
        self.value = None;
        self.status = DecisionStatus::Open;
        if let (Some(sink), Some(key)) = (&self.output, &self.output_key) {
            sink.borrow_mut().remove(key);
        }
        if let (Some(key), Some(registry)) = (&self.global_key, self.registry()) {
            registry.remove_stored(key);
        }
    }

    /// Answers the decision through `frontend`.
    ///
    /// A decision loaded from a previous run is returned as is. Returns
    /// `Ok(None)` if the decision ended up skipped.
    pub fn decide(
        &mut self,
        frontend: &mut dyn Frontend,
    ) -> Result<Option<&DecisionValue>, DecisionError> {
        if self.status == DecisionStatus::LoadedDone {
            return Ok(self.value.as_ref());
        }
        if !self.is_open() {
            return Err(self.not_open());
        }
        match frontend.solve_collection(std::slice::from_mut(self)) {
            CollectionOutcome::Canceled => Err(DecisionError::Canceled),
            CollectionOutcome::Completed | CollectionOutcome::SkippedAll => Ok(self.value.as_ref()),
        }
    }

    /// Takes a stored answer, gated by the checksum.
    ///
    /// Returns whether the decision is now `LoadedDone`. A mismatching
    /// checksum or an invalid stored value leaves the decision open.
    pub fn load(&mut self, stored: &StoredDecision) -> bool {
        if !self.is_open() || !self.allow_load {
            return false;
        }
        if stored.checksum.as_deref() != self.validate_checksum.as_deref() {
            warn!(
                "Checksum mismatch for stored decision '{}', asking again",
                self.global_key.as_deref().unwrap_or(&self.question)
            );
            return false;
        }
        let Some(value) = self.kind.deserialize_value(stored) else {
            warn!("Stored answer for '{}' could not be read", self.question);
            return false;
        };
        if !self.validate(&value) {
            warn!("Stored answer for '{}' is no longer valid: {value}", self.question);
            return false;
        }
        debug!("loaded answer for '{}': {value}", self.question);
        self.value = Some(value);
        self.status = DecisionStatus::LoadedDone;
        self.write_output();
        true
    }

    /// Looks the global key up in the registry's stored answers.
    pub fn load_stored(&mut self) -> bool {
        let stored = match (&self.global_key, self.registry()) {
            (Some(key), Some(registry)) => registry.stored(key),
            _ => None,
        };
        stored.is_some_and(|stored| self.load(&stored))
    }

    /// Stored form of the answer, if this decision is savable.
    pub fn serialized(&self) -> Option<StoredDecision> {
        if self.global_key.is_none() || !self.allow_save || !self.status.is_answered() {
            return None;
        }
        let value = self.value.as_ref()?;
        Some(
            self.kind
                .serialize_value(value)
                .with_checksum(self.validate_checksum.clone()),
        )
    }

    /// Moves a savable answer to `SavedDone` and returns its stored entry.
    pub fn persist(&mut self) -> Option<(String, StoredDecision)> {
        let stored = self.serialized()?;
        let key = self.global_key.clone()?;
        self.status = DecisionStatus::SavedDone;
        Some((key, stored))
    }

    /// A copy for audit trails. It holds no global key registration and
    /// writes to no output sink.
    pub fn detached(&self) -> Decision {
        Decision {
            question: self.question.clone(),
            kind: Rc::clone(&self.kind),
            value: self.value.clone(),
            status: self.status,
            key: self.key.clone(),
            global_key: self.global_key.clone(),
            output: None,
            output_key: self.output_key.clone(),
            allow_skip: self.allow_skip,
            allow_load: self.allow_load,
            allow_save: self.allow_save,
            collect: false,
            validate_checksum: self.validate_checksum.clone(),
            validator: self.validator.clone(),
            registration: None,
        }
    }

    fn registry(&self) -> Option<DecisionRegistry> {
        self.registration.as_ref().and_then(|r| r.registry())
    }

    fn write_output(&self) {
        if let (Some(sink), Some(key), Some(value)) = (&self.output, &self.output_key, &self.value)
        {
            sink.borrow_mut().insert(key.clone(), value.clone());
        }
    }

    fn not_open(&self) -> DecisionError {
        DecisionError::NotOpen {
            question: self.question.clone(),
            status: self.status,
        }
    }
}

/// Collects the settings of a decision before it is registered.
pub struct DecisionBuilder {
    question: String,
    kind: Rc<dyn DecisionKind>,
    key: Option<String>,
    global_key: Option<String>,
    output: Option<AnswerSink>,
    output_key: Option<String>,
    allow_skip: bool,
    allow_load: bool,
    allow_save: bool,
    collect: bool,
    validate_checksum: Option<String>,
    validator: Option<Rc<Validator>>,
}

impl DecisionBuilder {
    pub fn new(question: impl Into<String>, kind: impl DecisionKind + 'static) -> Self {
        Self {
            question: question.into(),
            kind: Rc::new(kind),
            key: None,
            global_key: None,
            output: None,
            output_key: None,
            allow_skip: false,
            allow_load: true,
            allow_save: true,
            collect: false,
            validate_checksum: None,
            validator: None,
        }
    }

    /// Key used in [`DecisionBunch::to_answer_dict`](super::DecisionBunch::to_answer_dict).
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn global_key(mut self, key: impl Into<String>) -> Self {
        self.global_key = Some(key.into());
        self
    }

    pub fn output(mut self, sink: &AnswerSink, key: impl Into<String>) -> Self {
        self.output = Some(Rc::clone(sink));
        self.output_key = Some(key.into());
        self
    }

    pub fn allow_skip(mut self, allow: bool) -> Self {
        self.allow_skip = allow;
        self
    }

    pub fn allow_load(mut self, allow: bool) -> Self {
        self.allow_load = allow;
        self
    }

    pub fn allow_save(mut self, allow: bool) -> Self {
        self.allow_save = allow;
        self
    }

    pub fn collect(mut self, collect: bool) -> Self {
        self.collect = collect;
        self
    }

    pub fn validate_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.validate_checksum = Some(checksum.into());
        self
    }

    pub fn validator<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&DecisionValue) -> anyhow::Result<bool> + 'static,
    {
        self.validator = Some(Rc::new(predicate));
        self
    }

    /// Registers the decision in `registry`.
    ///
    /// Single-choice lists resolve immediately; otherwise a stored answer
    /// for the global key is loaded when allowed.
    pub fn build(self, registry: &DecisionRegistry) -> Result<Decision, DecisionError> {
        if self.collect && (self.output.is_none() || self.output_key.is_none()) {
            return Err(DecisionError::MissingOutput(self.question));
        }
        let registration = match &self.global_key {
            Some(key) => Some(Rc::new(registry.register(key)?)),
            None => None,
        };

        let mut decision = Decision {
            question: self.question,
            kind: self.kind,
            value: None,
            status: DecisionStatus::Open,
            key: self.key,
            global_key: self.global_key,
            output: self.output,
            output_key: self.output_key,
            allow_skip: self.allow_skip,
            allow_load: self.allow_load,
            allow_save: self.allow_save,
            collect: self.collect,
            validate_checksum: self.validate_checksum,
            validator: self.validator,
            registration,
        };

        if let Some(value) = decision.kind.auto_value() {
            debug!("'{}' has a single option, answering {value}", decision.question);
            decision.set_value(value)?;
        } else if decision.allow_load {
            decision.load_stored();
        }
        Ok(decision)
    }
}
