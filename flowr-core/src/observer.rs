//! Observation of state transitions.

use crate::rule::RuleId;
use crate::state::State;
use parking_lot::Mutex;

/// Receives a notification after each hook a state runs successfully.
pub trait StateObserver: Send + Sync {
    fn rule_entered(&self, state: &State, rule: &RuleId);

    fn rule_left(&self, state: &State, rule: &RuleId);
}

/// A single hook invocation seen by a [`Recorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visit {
    Enter(RuleId),
    Leave(RuleId),
}

/// Observer that records every visit in order.
#[derive(Debug, Default)]
pub struct Recorder {
    visits: Mutex<Vec<Visit>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// All visits, in the order they happened.
    pub fn visits(&self) -> Vec<Visit> {
        self.visits.lock().clone()
    }

    /// Rules entered, in order.
    pub fn entered(&self) -> Vec<RuleId> {
        self.visits
            .lock()
            .iter()
            .filter_map(|v| match v {
                Visit::Enter(rule) => Some(rule.clone()),
                Visit::Leave(_) => None,
            })
            .collect()
    }

    /// Rules left, in order.
    pub fn left(&self) -> Vec<RuleId> {
        self.visits
            .lock()
            .iter()
            .filter_map(|v| match v {
                Visit::Leave(rule) => Some(rule.clone()),
                Visit::Enter(_) => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.visits.lock().clear();
    }
}

impl StateObserver for Recorder {
    fn rule_entered(&self, _state: &State, rule: &RuleId) {
        self.visits.lock().push(Visit::Enter(rule.clone()));
    }

    fn rule_left(&self, _state: &State, rule: &RuleId) {
        self.visits.lock().push(Visit::Leave(rule.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::FlowId;

    #[test]
    fn test_recorder_order_and_clear() {
        let recorder = Recorder::new();
        let state = State::new(FlowId::new());

        recorder.rule_entered(&state, &RuleId::from("t::A"));
        recorder.rule_left(&state, &RuleId::from("t::A"));
        recorder.rule_entered(&state, &RuleId::from("t::B"));

        assert_eq!(
            recorder.visits(),
            vec![
                Visit::Enter(RuleId::from("t::A")),
                Visit::Leave(RuleId::from("t::A")),
                Visit::Enter(RuleId::from("t::B")),
            ]
        );
        assert_eq!(recorder.left(), vec![RuleId::from("t::A")]);

        recorder.clear();
        assert!(recorder.visits().is_empty());
        assert!(recorder.entered().is_empty());
    }
}
