use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use log::info;

use super::state::{Decision, DecisionStatus};
use super::value::DecisionValue;
use crate::error::DecisionError;
use crate::frontend::{CollectionOutcome, Frontend};

/// An ordered batch of decisions solved together.
#[derive(Debug, Default)]
pub struct DecisionBunch {
    decisions: Vec<Decision>,
}

impl DecisionBunch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, decision: Decision) {
        self.decisions.push(decision);
    }

    pub fn into_inner(self) -> Vec<Decision> {
        self.decisions
    }

    pub fn open_count(&self) -> usize {
        self.decisions.iter().filter(|d| d.is_open()).count()
    }

    /// Answers so far, keyed by each decision's `key`.
    ///
    /// Decisions without a key or without a usable value are left out.
    pub fn to_answer_dict(&self) -> BTreeMap<String, DecisionValue> {
        self.decisions
            .iter()
            .filter(|d| d.status().is_answered())
            .filter_map(|d| Some((d.key()?.to_string(), d.value()?.clone())))
            .collect()
    }

    /// Solves every open decision through `frontend`.
    ///
    /// Skip-all leaves the remaining skippable decisions skipped and returns
    /// normally. Cancel is returned as [`DecisionError::Canceled`].
    pub fn decide_collected(&mut self, frontend: &mut dyn Frontend) -> Result<(), DecisionError> {
        if self.open_count() == 0 {
            return Ok(());
        }
        match frontend.solve_collection(&mut self.decisions) {
            CollectionOutcome::Completed => Ok(()),
            CollectionOutcome::SkippedAll => {
                info!("Skipping remaining decisions");
                for decision in self.decisions.iter_mut() {
                    if decision.is_open() && decision.allow_skip() {
                        decision.skip()?;
                    }
                }
                Ok(())
            }
            CollectionOutcome::Canceled => {
                info!("Canceling decisions");
                Err(DecisionError::Canceled)
            }
        }
    }

    pub fn count_by_status(&self, status: DecisionStatus) -> usize {
        self.decisions.iter().filter(|d| d.status() == status).count()
    }
}

impl Deref for DecisionBunch {
    type Target = [Decision];

    fn deref(&self) -> &Self::Target {
        &self.decisions
    }
}

impl DerefMut for DecisionBunch {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.decisions
    }
}

impl From<Vec<Decision>> for DecisionBunch {
    fn from(decisions: Vec<Decision>) -> Self {
        Self { decisions }
    }
}

impl FromIterator<Decision> for DecisionBunch {
    fn from_iter<I: IntoIterator<Item = Decision>>(iter: I) -> Self {
        Self {
            decisions: iter.into_iter().collect(),
        }
    }
}

impl Extend<Decision> for DecisionBunch {
    fn extend<I: IntoIterator<Item = Decision>>(&mut self, iter: I) {
        self.decisions.extend(iter);
    }
}

impl IntoIterator for DecisionBunch {
    type Item = Decision;
    type IntoIter = std::vec::IntoIter<Decision>;

    fn into_iter(self) -> Self::IntoIter {
        self.decisions.into_iter()
    }
}

impl<'a> IntoIterator for &'a DecisionBunch {
    type Item = &'a Decision;
    type IntoIter = std::slice::Iter<'a, Decision>;

    fn into_iter(self) -> Self::IntoIter {
        self.decisions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionRegistry;

    /// Answers the first decision, then returns a fixed outcome.
    struct FirstThen(CollectionOutcome);

    impl Frontend for FirstThen {
        fn solve_collection(&mut self, decisions: &mut [Decision]) -> CollectionOutcome {
            if let Some(first) = decisions.iter_mut().find(|d| d.is_open()) {
                first.set_value(DecisionValue::Bool(true)).unwrap();
            }
            self.0
        }
    }

    fn bunch(registry: &DecisionRegistry, skippable: bool) -> DecisionBunch {
        (0..3)
            .map(|i| {
                Decision::bool(format!("Question {i}?"))
                    .key(format!("q{i}"))
                    .allow_skip(skippable)
                    .build(registry)
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn answer_dict_uses_key_of_answered_decisions() {
        let registry = DecisionRegistry::new();
        let mut b = bunch(&registry, true);
        b[0].set_value(DecisionValue::Bool(true)).unwrap();
        b[1].skip().unwrap();
        b.push(Decision::bool("No key?").build(&registry).unwrap());
        let last = b.len() - 1;
        b[last].set_value(DecisionValue::Bool(false)).unwrap();

        let answers = b.to_answer_dict();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers.get("q0"), Some(&DecisionValue::Bool(true)));
    }

    #[test]
    fn skip_all_skips_the_rest() {
        let registry = DecisionRegistry::new();
        let mut b = bunch(&registry, true);
        b.decide_collected(&mut FirstThen(CollectionOutcome::SkippedAll))
            .unwrap();
        assert_eq!(b[0].status(), DecisionStatus::Done);
        assert_eq!(b.count_by_status(DecisionStatus::Skipped), 2);
    }

    #[test]
    fn cancel_propagates() {
        let registry = DecisionRegistry::new();
        let mut b = bunch(&registry, false);
        let err = b
            .decide_collected(&mut FirstThen(CollectionOutcome::Canceled))
            .unwrap_err();
        assert!(matches!(err, DecisionError::Canceled));
        assert_eq!(b.open_count(), 2);
    }

    #[test]
    fn extend_keeps_order() {
        let registry = DecisionRegistry::new();
        let mut b = DecisionBunch::new();
        b.extend(bunch(&registry, false));
        b.extend(vec![Decision::text("Name?").key("name").build(&registry).unwrap()]);
        let keys: Vec<_> = b.iter().filter_map(|d| d.key()).collect();
        assert_eq!(keys, vec!["q0", "q1", "q2", "name"]);
    }
}
