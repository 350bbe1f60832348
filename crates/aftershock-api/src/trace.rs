//! Ordered decisions of one run

use serde::{Deserialize, Serialize};

use crate::{are_events_equal, Action};

/// Every decision of a run, in the order the orchestrator finalized them.
/// Each action carries its originating event, if any.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trace {
    pub action_sequence: Vec<Action>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) {
        self.action_sequence.push(action);
    }

    pub fn len(&self) -> usize {
        self.action_sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.action_sequence.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.action_sequence.iter()
    }
}

/// Whether two action sequences decided the same occurrences in the same
/// order. Decision ids are freshly minted per run and are not compared.
pub fn are_action_slices_equal(a: &[Action], b: &[Action]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b.iter())
            .all(|(x, y)| are_events_equal(x.event.as_ref(), y.event.as_ref()))
}

pub fn are_traces_equal(a: &Trace, b: &Trace) -> bool {
    are_action_slices_equal(&a.action_sequence, &b.action_sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{make_fault_injection_action, Event};
    use aftershock_util::EntityId;

    fn trace_of(names: &[(&str, &str)]) -> Trace {
        let mut trace = Trace::new();
        for (entity, func) in names {
            let event = Event::func_call(EntityId::new(*entity), *func);
            trace.push(event.make_accept_action().unwrap());
        }
        trace
    }

    #[test]
    fn trace_equals_itself() {
        let trace = trace_of(&[("a", "foo"), ("b", "bar")]);
        assert!(are_traces_equal(&trace, &trace));
        assert!(are_traces_equal(&Trace::new(), &Trace::new()));
    }

    #[test]
    fn equal_runs_ignore_decision_ids() {
        let first = trace_of(&[("a", "foo"), ("b", "bar")]);
        let second = trace_of(&[("a", "foo"), ("b", "bar")]);
        assert!(are_traces_equal(&first, &second));
    }

    #[test]
    fn removing_a_decision_breaks_equality() {
        let trace = trace_of(&[("a", "foo"), ("b", "bar"), ("a", "baz")]);
        for i in 0..trace.len() {
            let mut shorter = trace.clone();
            shorter.action_sequence.remove(i);
            assert!(!are_traces_equal(&trace, &shorter));
            assert!(!are_traces_equal(&shorter, &trace));
        }
    }

    #[test]
    fn reordering_breaks_equality() {
        let ab = trace_of(&[("a", "foo"), ("b", "bar")]);
        let ba = trace_of(&[("b", "bar"), ("a", "foo")]);
        assert!(!are_traces_equal(&ab, &ba));
    }

    #[test]
    fn fault_decisions_compare_as_eventless() {
        let mut first = trace_of(&[("a", "foo")]);
        first.push(make_fault_injection_action(EntityId::new("a")));
        let mut second = trace_of(&[("a", "foo")]);
        second.push(make_fault_injection_action(EntityId::new("b")));
        assert!(are_traces_equal(&first, &second));
    }

    #[test]
    fn trace_serializes_for_storage() {
        let trace = trace_of(&[("a", "foo")]);
        let json = serde_json::to_string(&trace).unwrap();
        let parsed: Trace = serde_json::from_str(&json).unwrap();
        assert!(are_traces_equal(&trace, &parsed));
    }
}
