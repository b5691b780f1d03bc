//! Built-in pipeline steps.

mod classify;
mod export;
mod load_model;
mod parameters;
mod reset;

pub use classify::Classify;
pub use export::{EXPORT_FILE, ExportSummary};
pub use load_model::{Entity, LoadModel};
pub use parameters::{Parameters, U_VALUE_UNIT};
pub use reset::ResetProject;

use crate::playground::{TaskFactory, factory};

pub fn builtin() -> Vec<TaskFactory> {
    vec![
        factory::<LoadModel>,
        factory::<Classify>,
        factory::<Parameters>,
        factory::<ExportSummary>,
        factory::<ResetProject>,
    ]
}
