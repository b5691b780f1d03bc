use std::collections::BTreeSet;

use serde_json::{Value, json};

use crate::decision::{
    AnswerSink, Decision, DecisionBuilder, DecisionBunch, DecisionValue, RealKind, answer_sink,
};
use crate::error::TaskError;
use crate::playground::{State, Step, Task, TaskContext, Touches};

pub const U_VALUE_UNIT: &str = "W/(m2K)";

/// Upper bound for a plausible thermal transmittance.
const MAX_U_VALUE: f64 = 10.0;

/// Asks for the building wide parameters the simulation needs: whether the
/// building is heated and one U-value per element class.
#[derive(Debug)]
pub struct Parameters {
    u_values: AnswerSink,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            u_values: answer_sink(),
        }
    }
}

impl Task for Parameters {
    fn name(&self) -> &'static str {
        "parameters"
    }

    fn description(&self) -> &'static str {
        "Enrich element classes with thermal parameters"
    }

    fn reads(&self) -> &'static [&'static str] {
        &["classified"]
    }

    fn touches(&self) -> Touches {
        Touches::Keys(&["parameters"])
    }

    fn run(&mut self, inputs: State, ctx: &mut TaskContext) -> Result<Step, TaskError> {
        let classified = inputs
            .get("classified")
            .and_then(Value::as_object)
            .ok_or_else(|| TaskError::MissingInput("classified".into()))?;
        let classes: BTreeSet<&str> = classified.values().filter_map(Value::as_str).collect();

        let mut bunch = DecisionBunch::new();
        bunch.push(
            Decision::bool("Is the building heated?")
                .key("heated")
                .global_key("building_heated")
                .build(&ctx.registry)?,
        );
        for class in classes {
            bunch.push(
                DecisionBuilder::new(
                    format!("U-value of {class}?"),
                    RealKind::bounded(U_VALUE_UNIT, Some(0.0), Some(MAX_U_VALUE)),
                )
                .global_key(format!("{class}_u_value"))
                .output(&self.u_values, class)
                .collect(true)
                .validator(|value| Ok(value.as_quantity().is_some_and(|q| q.magnitude > 0.0)))
                .build(&ctx.registry)?,
            );
        }
        Ok(Step::Suspend(bunch))
    }

    fn resume(&mut self, bunch: DecisionBunch, _ctx: &mut TaskContext) -> Result<Step, TaskError> {
        let heated = bunch
            .to_answer_dict()
            .get("heated")
            .and_then(DecisionValue::as_bool)
            .ok_or_else(|| TaskError::MissingInput("heated".into()))?;
        let u_values: serde_json::Map<String, Value> = self
            .u_values
            .borrow()
            .iter()
            .map(|(class, value)| (class.clone(), value.to_json()))
            .collect();
        Ok(Step::Done(vec![json!({
            "heated": heated,
            "u_values": u_values,
        })]))
    }
}
