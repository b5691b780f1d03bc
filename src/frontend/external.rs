//! Request/response protocol for remote user interfaces.
//!
//! Each round the pending decisions are sent as `{id, question, options, body}`
//! and a map `{id: raw_answer}` is expected back. Answers that match no
//! pending decision, or that do not validate, are logged and dropped; the
//! rest stay pending for the next round.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use log::{debug, error, warn};
use serde::Serialize;
use uuid::Uuid;

use super::{
    CollectionOutcome, DEFAULT_MAX_ATTEMPTS, Frontend, Resolution, interpret, skip_remaining,
};
use crate::decision::{Decision, DecisionOption};
use crate::error::FrontendError;

#[derive(Debug, Clone, Serialize)]
pub struct DecisionRequest {
    pub id: String,
    pub question: String,
    pub options: Vec<DecisionOption>,
    pub body: serde_json::Value,
}

impl DecisionRequest {
    fn new(id: &str, decision: &Decision, offer_skip_all: bool) -> Self {
        let kind = decision.kind();
        Self {
            id: id.to_string(),
            question: decision.question().to_string(),
            options: kind.options(),
            body: serde_json::json!({
                "kind": kind.name(),
                "hint": kind.hint(),
                "allow_skip": decision.allow_skip(),
                "skip_all": offer_skip_all,
                "details": kind.body(),
            }),
        }
    }
}

/// Transport for one round of the protocol.
pub trait ExternalChannel {
    fn exchange(
        &mut self,
        requests: &[DecisionRequest],
    ) -> Result<BTreeMap<String, String>, FrontendError>;
}

impl<F> ExternalChannel for F
where
    F: FnMut(&[DecisionRequest]) -> Result<BTreeMap<String, String>, FrontendError>,
{
    fn exchange(
        &mut self,
        requests: &[DecisionRequest],
    ) -> Result<BTreeMap<String, String>, FrontendError> {
        self(requests)
    }
}

/// Writes each round as one JSON line and reads one JSON object line back.
pub struct JsonLinesChannel<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> JsonLinesChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

impl<R: BufRead, W: Write> ExternalChannel for JsonLinesChannel<R, W> {
    fn exchange(
        &mut self,
        requests: &[DecisionRequest],
    ) -> Result<BTreeMap<String, String>, FrontendError> {
        let line = serde_json::to_string(&serde_json::json!({ "decisions": requests }))?;
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;

        let mut reply = String::new();
        if self.reader.read_line(&mut reply)? == 0 {
            return Err(FrontendError::Closed);
        }
        let answers: BTreeMap<String, serde_json::Value> = serde_json::from_str(reply.trim())?;
        Ok(answers
            .into_iter()
            .map(|(id, value)| {
                let raw = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (id, raw)
            })
            .collect())
    }
}

pub struct ExternalFrontend<C> {
    channel: C,
    max_rounds: u32,
}

impl<C: ExternalChannel> ExternalFrontend<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            max_rounds: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn into_channel(self) -> C {
        self.channel
    }
}

impl<C: ExternalChannel> Frontend for ExternalFrontend<C> {
    fn solve_collection(&mut self, decisions: &mut [Decision]) -> CollectionOutcome {
        // (request id, index into `decisions`), in decision order.
        let mut pending: Vec<(String, usize)> = decisions
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_open())
            .map(|(i, _)| (Uuid::new_v4().to_string(), i))
            .collect();
        let offer_skip_all =
            !pending.is_empty() && pending.iter().all(|(_, i)| decisions[*i].allow_skip());

        for round in 1..=self.max_rounds {
            if pending.is_empty() {
                return CollectionOutcome::Completed;
            }
            let requests: Vec<DecisionRequest> = pending
                .iter()
                .map(|(id, i)| DecisionRequest::new(id, &decisions[*i], offer_skip_all))
                .collect();
            debug!("round {round}: sending {} decision(s)", requests.len());

            let mut answers = match self.channel.exchange(&requests) {
                Ok(answers) => answers,
                Err(err) => {
                    error!("External frontend failed: {err}");
                    return CollectionOutcome::Canceled;
                }
            };
            answers.retain(|id, _| {
                let known = pending.iter().any(|(pending_id, _)| pending_id == id);
                if !known {
                    warn!("Dropping answer for unknown decision id {id}");
                }
                known
            });

            // Answers are applied in decision order, whatever order they arrived in.
            let mut still_pending = Vec::with_capacity(pending.len());
            for (pos, (id, index)) in pending.iter().enumerate() {
                let index = *index;
                let Some(raw) = answers.remove(id) else {
                    still_pending.push((id.clone(), index));
                    continue;
                };
                let applied = match interpret(&decisions[index], &raw, offer_skip_all) {
                    Ok(Resolution::Answered(value)) => decisions[index].set_value(value),
                    Ok(Resolution::Skipped) => decisions[index].skip(),
                    Ok(Resolution::SkippedAll) => {
                        let rest: Vec<usize> = pending[pos..].iter().map(|(_, i)| *i).collect();
                        skip_remaining(decisions, &rest);
                        return CollectionOutcome::SkippedAll;
                    }
                    Ok(Resolution::Canceled) => return CollectionOutcome::Canceled,
                    Err(reason) => {
                        warn!(
                            "Dropping answer for '{}': {reason}",
                            decisions[index].question()
                        );
                        still_pending.push((id.clone(), index));
                        continue;
                    }
                };
                if let Err(err) = applied {
                    warn!("Dropping answer {id}: {err}");
                    still_pending.push((id.clone(), index));
                }
            }
            pending = still_pending;
        }

        if pending.is_empty() {
            CollectionOutcome::Completed
        } else {
            error!(
                "{} decision(s) still pending after {} rounds",
                pending.len(),
                self.max_rounds
            );
            CollectionOutcome::Canceled
        }
    }
}
