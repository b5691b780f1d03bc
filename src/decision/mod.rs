//! Decisions: questions a task asks, their answers and their lifecycle.

mod bunch;
mod kind;
mod registry;
mod state;
mod value;

pub use bunch::DecisionBunch;
pub use kind::{
    BoolKind, Choice, DecisionKind, DecisionOption, GuidKind, ListKind, RealKind, TextKind,
    choices_checksum,
};
pub use registry::DecisionRegistry;
pub use state::{AnswerSink, Decision, DecisionBuilder, DecisionStatus, Validator, answer_sink};
pub use value::{DecisionValue, Quantity};
