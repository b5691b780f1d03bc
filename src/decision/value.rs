use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

/// A magnitude with its physical unit, e.g. `0.24 W/(m2K)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quantity {
    pub magnitude: f64,
    pub unit: String,
}

impl Quantity {
    pub fn new(magnitude: f64, unit: impl Into<String>) -> Self {
        Self {
            magnitude,
            unit: unit.into(),
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_empty() {
            write!(f, "{}", self.magnitude)
        } else {
            write!(f, "{} {}", self.magnitude, self.unit)
        }
    }
}

/// The answer to a decision.
///
/// Serializes untagged so that answers read naturally inside task state:
/// `true`, `"Wall"`, `{"magnitude": 0.24, "unit": "W/(m2K)"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecisionValue {
    Bool(bool),
    Real(Quantity),
    Choice(String),
    Text(String),
    Guids(BTreeSet<String>),
}

impl DecisionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DecisionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_quantity(&self) -> Option<&Quantity> {
        match self {
            DecisionValue::Real(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DecisionValue::Choice(s) | DecisionValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for DecisionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionValue::Bool(b) => write!(f, "{b}"),
            DecisionValue::Real(q) => write!(f, "{q}"),
            DecisionValue::Choice(s) | DecisionValue::Text(s) => write!(f, "{s}"),
            DecisionValue::Guids(guids) => {
                let joined: Vec<&str> = guids.iter().map(String::as_str).collect();
                write!(f, "{}", joined.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_value_json_keeps_unit() {
        let v = DecisionValue::Real(Quantity::new(0.24, "W/(m2K)"));
        assert_eq!(
            v.to_json(),
            serde_json::json!({"magnitude": 0.24, "unit": "W/(m2K)"})
        );
        assert_eq!(v.to_string(), "0.24 W/(m2K)");
    }

    #[test]
    fn choice_value_is_plain_string() {
        let v = DecisionValue::Choice("IfcWall".into());
        assert_eq!(v.to_json(), serde_json::json!("IfcWall"));
        assert_eq!(v.as_str(), Some("IfcWall"));
        assert_eq!(v.as_bool(), None);
    }
}
