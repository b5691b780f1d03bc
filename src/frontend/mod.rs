//! Answer sources for decisions.
//!
//! A [`Frontend`] solves a batch of decisions. Skip, skip-all and cancel are
//! not errors here: each question resolves to a [`Resolution`], and a whole
//! batch to a [`CollectionOutcome`].

mod console;
mod external;

pub use console::ConsoleFrontend;
pub use external::{DecisionRequest, ExternalChannel, ExternalFrontend, JsonLinesChannel};

use std::fmt;

use log::warn;

use crate::decision::{Decision, DecisionValue};

/// Attempts per question before the batch is canceled.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// How a single question was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Answered(DecisionValue),
    Skipped,
    SkippedAll,
    Canceled,
}

/// How a batch of decisions ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionOutcome {
    Completed,
    SkippedAll,
    Canceled,
}

pub trait Frontend {
    /// Solves the open decisions in `decisions`, in order.
    ///
    /// Decisions that are not open are left untouched. On
    /// [`CollectionOutcome::SkippedAll`] the current and all later skippable
    /// decisions are already skipped.
    fn solve_collection(&mut self, decisions: &mut [Decision]) -> CollectionOutcome;
}

/// Position of a question within its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}]", self.current, self.total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Skip,
    SkipAll,
    Cancel,
}

/// Recognizes `skip`, `skip all` and `cancel`, ignoring case.
pub fn parse_command(raw: &str) -> Option<Command> {
    let words: Vec<String> = raw.split_whitespace().map(str::to_lowercase).collect();
    match words.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["skip"] => Some(Command::Skip),
        ["skip", "all"] | ["skipall"] | ["skip_all"] => Some(Command::SkipAll),
        ["cancel"] => Some(Command::Cancel),
        _ => None,
    }
}

/// Turns raw text into a resolution for `decision`, or a reason to ask again.
pub(crate) fn interpret(
    decision: &Decision,
    raw: &str,
    offer_skip_all: bool,
) -> Result<Resolution, String> {
    match parse_command(raw) {
        Some(Command::Cancel) => return Ok(Resolution::Canceled),
        Some(Command::SkipAll) if offer_skip_all => return Ok(Resolution::SkippedAll),
        Some(Command::SkipAll) => return Err("skip all is not available here".to_string()),
        Some(Command::Skip) if decision.allow_skip() => return Ok(Resolution::Skipped),
        Some(Command::Skip) => return Err("this decision can not be skipped".to_string()),
        None => {}
    }
    let raw = raw.trim();
    let Some(value) = decision.kind().parse(raw) else {
        return Err(format!("could not read '{raw}', expected {}", decision.kind().hint()));
    };
    if !decision.validate(&value) {
        return Err(format!("'{value}' is not a valid answer"));
    }
    Ok(Resolution::Answered(value))
}

/// Drives `ask` over the open decisions one at a time and applies each
/// resolution.
pub fn solve_sequentially<F>(decisions: &mut [Decision], mut ask: F) -> CollectionOutcome
where
    F: FnMut(&Decision, Progress, bool) -> Resolution,
{
    let open: Vec<usize> = decisions
        .iter()
        .enumerate()
        .filter(|(_, d)| d.is_open())
        .map(|(i, _)| i)
        .collect();
    let total = open.len();
    let offer_skip_all = total > 0 && open.iter().all(|&i| decisions[i].allow_skip());

    for (n, &i) in open.iter().enumerate() {
        let progress = Progress {
            current: n + 1,
            total,
        };
        match ask(&decisions[i], progress, offer_skip_all) {
            Resolution::Answered(value) => {
                if let Err(err) = decisions[i].set_value(value) {
                    warn!("{err}");
                    return CollectionOutcome::Canceled;
                }
            }
            Resolution::Skipped => {
                if let Err(err) = decisions[i].skip() {
                    warn!("{err}");
                    return CollectionOutcome::Canceled;
                }
            }
            Resolution::SkippedAll => {
                skip_remaining(decisions, &open[n..]);
                return CollectionOutcome::SkippedAll;
            }
            Resolution::Canceled => return CollectionOutcome::Canceled,
        }
    }
    CollectionOutcome::Completed
}

pub(crate) fn skip_remaining(decisions: &mut [Decision], indices: &[usize]) {
    for &i in indices {
        let decision = &mut decisions[i];
        if decision.is_open() && decision.allow_skip() {
            if let Err(err) = decision.skip() {
                warn!("{err}");
            }
        }
    }
}
