use thiserror::Error;

use crate::decision::DecisionStatus;

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("decision '{question}' is not open (status: {status})")]
    NotOpen {
        question: String,
        status: DecisionStatus,
    },

    #[error("invalid value for decision '{question}': {value}")]
    InvalidValue { question: String, value: String },

    #[error("decision '{0}' can not be skipped")]
    SkipNotAllowed(String),

    #[error("global key '{0}' is already used by an active decision")]
    DuplicateGlobalKey(String),

    #[error("decision '{0}' collects its answer but has no output sink or output key")]
    MissingOutput(String),

    #[error("decision '{0}' is needed but has not been answered yet")]
    Pending(String),

    #[error("decisions were canceled")]
    Canceled,
}

/// Errors raised by task code while it runs inside the playground.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("decisions were canceled")]
    Canceled,

    #[error("task was resumed although it never suspended")]
    UnexpectedResume,

    #[error("missing input '{0}'")]
    MissingInput(String),

    #[error("task returned {got} result(s) but touches {expected}")]
    ResultArity { expected: usize, got: usize },

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Decision(#[from] DecisionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PlaygroundError {
    #[error("requirements of task '{0}' are not met")]
    RequirementsNotMet(String),

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("task '{task}' failed: {source}")]
    TaskFailed {
        task: String,
        #[source]
        source: TaskError,
    },

    #[error("task '{task}' was canceled")]
    Canceled { task: String },

    #[error(transparent)]
    Decision(#[from] DecisionError),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no converter for decision file version {version}")]
    Unconvertible { version: String },

    #[error(transparent)]
    Decision(#[from] DecisionError),
}

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("channel closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed answer: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_open_display() {
        let err = DecisionError::NotOpen {
            question: "Wall type?".into(),
            status: DecisionStatus::Done,
        };
        assert_eq!(err.to_string(), "decision 'Wall type?' is not open (status: done)");
    }

    #[test]
    fn task_failed_keeps_source() {
        let err = PlaygroundError::TaskFailed {
            task: "classify".into(),
            source: TaskError::ResultArity {
                expected: 2,
                got: 1,
            },
        };
        assert_eq!(
            err.to_string(),
            "task 'classify' failed: task returned 1 result(s) but touches 2"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
