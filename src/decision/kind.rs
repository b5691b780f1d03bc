//! Decision variants.
//!
//! Every variant implements [`DecisionKind`], the capability set the rest of
//! the crate relies on: checking a value, parsing raw user input, turning a
//! value into its stored form and back, and describing itself to a frontend.
//! Frontends never branch on the concrete variant.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::value::{DecisionValue, Quantity};
use crate::persistence::StoredDecision;

/// One selectable entry shown to the user, `(index, label, value)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionOption {
    pub index: usize,
    pub label: String,
    pub value: String,
}

pub trait DecisionKind: fmt::Debug {
    /// Short type name used in logs and the external protocol body.
    fn name(&self) -> &'static str;

    /// Type and range specific validation.
    fn check(&self, value: &DecisionValue) -> bool;

    /// Parses raw text input. `None` means the input is not understood.
    fn parse(&self, raw: &str) -> Option<DecisionValue>;

    fn serialize_value(&self, value: &DecisionValue) -> StoredDecision;

    fn deserialize_value(&self, stored: &StoredDecision) -> Option<DecisionValue>;

    fn options(&self) -> Vec<DecisionOption> {
        Vec::new()
    }

    fn body(&self) -> Option<serde_json::Value> {
        None
    }

    /// A value that answers the decision without asking anybody.
    fn auto_value(&self) -> Option<DecisionValue> {
        None
    }

    /// Input hint printed next to the prompt.
    fn hint(&self) -> String;
}

#[derive(Debug, Clone, Default)]
pub struct BoolKind;

impl BoolKind {
    pub fn parse_flag(raw: &str) -> Option<bool> {
        match raw.trim().to_lowercase().as_str() {
            "y" | "yes" | "true" | "t" | "1" | "on" => Some(true),
            "n" | "no" | "false" | "f" | "0" | "off" => Some(false),
            _ => None,
        }
    }
}

impl DecisionKind for BoolKind {
    fn name(&self) -> &'static str {
        "bool"
    }

    fn check(&self, value: &DecisionValue) -> bool {
        matches!(value, DecisionValue::Bool(_))
    }

    fn parse(&self, raw: &str) -> Option<DecisionValue> {
        Self::parse_flag(raw).map(DecisionValue::Bool)
    }

    fn serialize_value(&self, value: &DecisionValue) -> StoredDecision {
        StoredDecision::new(value.as_bool().map_or(serde_json::Value::Null, Into::into))
    }

    fn deserialize_value(&self, stored: &StoredDecision) -> Option<DecisionValue> {
        stored.value.as_bool().map(DecisionValue::Bool)
    }

    fn hint(&self) -> String {
        "[y/n]".to_string()
    }
}

/// A numeric answer carrying a physical unit.
#[derive(Debug, Clone)]
pub struct RealKind {
    pub unit: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RealKind {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            min: None,
            max: None,
        }
    }

    pub fn bounded(unit: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            unit: unit.into(),
            min,
            max,
        }
    }
}

impl DecisionKind for RealKind {
    fn name(&self) -> &'static str {
        "real"
    }

    fn check(&self, value: &DecisionValue) -> bool {
        let DecisionValue::Real(q) = value else {
            return false;
        };
        q.magnitude.is_finite()
            && q.unit == self.unit
            && self.min.is_none_or(|min| q.magnitude >= min)
            && self.max.is_none_or(|max| q.magnitude <= max)
    }

    fn parse(&self, raw: &str) -> Option<DecisionValue> {
        let mut parts = raw.split_whitespace();
        let magnitude: f64 = parts.next()?.replace(',', ".").parse().ok()?;
        let unit: Vec<&str> = parts.collect();
        let unit = if unit.is_empty() {
            self.unit.clone()
        } else {
            unit.join(" ")
        };
        Some(DecisionValue::Real(Quantity::new(magnitude, unit)))
    }

    fn serialize_value(&self, value: &DecisionValue) -> StoredDecision {
        match value.as_quantity() {
            Some(q) => StoredDecision::new(q.magnitude.into()).with_unit(q.unit.clone()),
            None => StoredDecision::new(serde_json::Value::Null),
        }
    }

    fn deserialize_value(&self, stored: &StoredDecision) -> Option<DecisionValue> {
        let magnitude = stored.value.as_f64()?;
        let unit = stored.unit.clone().unwrap_or_else(|| self.unit.clone());
        Some(DecisionValue::Real(Quantity::new(magnitude, unit)))
    }

    fn body(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "unit": self.unit,
            "min": self.min,
            "max": self.max,
        }))
    }

    fn hint(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("value in {} ({min}..{max})", self.unit),
            (Some(min), None) => format!("value in {} (>= {min})", self.unit),
            (None, Some(max)) => format!("value in {} (<= {max})", self.unit),
            (None, None) => format!("value in {}", self.unit),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub key: String,
    pub label: String,
}

/// Pick one entry of a fixed, ordered choice set.
#[derive(Debug, Clone)]
pub struct ListKind {
    choices: Vec<Choice>,
}

impl ListKind {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let choices = keys
            .into_iter()
            .map(|k| {
                let key = k.into();
                Choice {
                    label: key.clone(),
                    key,
                }
            })
            .collect();
        Self { choices }
    }

    pub fn with_labels<I, K, L>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, L)>,
        K: Into<String>,
        L: Into<String>,
    {
        let choices = pairs
            .into_iter()
            .map(|(k, l)| Choice {
                key: k.into(),
                label: l.into(),
            })
            .collect();
        Self { choices }
    }

    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    pub fn checksum(&self) -> String {
        choices_checksum(self.choices.iter().map(|c| c.key.as_str()))
    }
}

impl DecisionKind for ListKind {
    fn name(&self) -> &'static str {
        "list"
    }

    fn check(&self, value: &DecisionValue) -> bool {
        match value {
            DecisionValue::Choice(key) => self.choices.iter().any(|c| &c.key == key),
            _ => false,
        }
    }

    /// An exact key wins over an index, and an index over a case-insensitive key.
    fn parse(&self, raw: &str) -> Option<DecisionValue> {
        let raw = raw.trim();
        self.choices
            .iter()
            .find(|c| c.key == raw)
            .or_else(|| raw.parse::<usize>().ok().and_then(|i| self.choices.get(i)))
            .or_else(|| self.choices.iter().find(|c| c.key.eq_ignore_ascii_case(raw)))
            .map(|c| DecisionValue::Choice(c.key.clone()))
    }

    fn serialize_value(&self, value: &DecisionValue) -> StoredDecision {
        StoredDecision::new(value.as_str().map_or(serde_json::Value::Null, Into::into))
    }

    fn deserialize_value(&self, stored: &StoredDecision) -> Option<DecisionValue> {
        stored
            .value
            .as_str()
            .map(|s| DecisionValue::Choice(s.to_string()))
    }

    fn options(&self) -> Vec<DecisionOption> {
        self.choices
            .iter()
            .enumerate()
            .map(|(index, c)| DecisionOption {
                index,
                label: c.label.clone(),
                value: c.key.clone(),
            })
            .collect()
    }

    fn auto_value(&self) -> Option<DecisionValue> {
        match self.choices.as_slice() {
            [only] => Some(DecisionValue::Choice(only.key.clone())),
            _ => None,
        }
    }

    fn hint(&self) -> String {
        format!("index 0..{}", self.choices.len().saturating_sub(1))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextKind;

impl DecisionKind for TextKind {
    fn name(&self) -> &'static str {
        "text"
    }

    fn check(&self, value: &DecisionValue) -> bool {
        matches!(value, DecisionValue::Text(s) if !s.trim().is_empty())
    }

    fn parse(&self, raw: &str) -> Option<DecisionValue> {
        let raw = raw.trim();
        (!raw.is_empty()).then(|| DecisionValue::Text(raw.to_string()))
    }

    fn serialize_value(&self, value: &DecisionValue) -> StoredDecision {
        StoredDecision::new(value.as_str().map_or(serde_json::Value::Null, Into::into))
    }

    fn deserialize_value(&self, stored: &StoredDecision) -> Option<DecisionValue> {
        stored
            .value
            .as_str()
            .map(|s| DecisionValue::Text(s.to_string()))
    }

    fn hint(&self) -> String {
        "text".to_string()
    }
}

/// One or more IFC GUIDs (22 characters of the IFC base64 alphabet).
#[derive(Debug, Clone)]
pub struct GuidKind {
    pub multiple: bool,
}

impl GuidKind {
    pub fn is_valid_guid(guid: &str) -> bool {
        guid.len() == 22
            && guid.starts_with(['0', '1', '2', '3'])
            && guid
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    }
}

impl DecisionKind for GuidKind {
    fn name(&self) -> &'static str {
        "guid"
    }

    fn check(&self, value: &DecisionValue) -> bool {
        let DecisionValue::Guids(guids) = value else {
            return false;
        };
        !guids.is_empty()
            && (self.multiple || guids.len() == 1)
            && guids.iter().all(|g| Self::is_valid_guid(g))
    }

    fn parse(&self, raw: &str) -> Option<DecisionValue> {
        let guids: BTreeSet<String> = raw
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        (!guids.is_empty()).then_some(DecisionValue::Guids(guids))
    }

    fn serialize_value(&self, value: &DecisionValue) -> StoredDecision {
        match value {
            DecisionValue::Guids(guids) => StoredDecision::new(serde_json::json!(guids)),
            _ => StoredDecision::new(serde_json::Value::Null),
        }
    }

    fn deserialize_value(&self, stored: &StoredDecision) -> Option<DecisionValue> {
        let guids = stored
            .value
            .as_array()?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect::<Option<BTreeSet<String>>>()?;
        Some(DecisionValue::Guids(guids))
    }

    fn hint(&self) -> String {
        if self.multiple {
            "IFC GUIDs, separated by comma".to_string()
        } else {
            "IFC GUID".to_string()
        }
    }
}

/// SHA-256 over the sorted, de-duplicated choice keys.
pub fn choices_checksum<'a, I>(keys: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let sorted: BTreeSet<&str> = keys.into_iter().collect();
    let mut hasher = Sha256::new();
    for key in sorted {
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
