//! Remembered state for history nodes.
//!
//! For each compound or parallel ancestor that owns a history marker,
//! the engine records the most recent concrete value of its subtree on
//! every exit. Recording is immutable: a new map is returned, the prior
//! one untouched.

use crate::value::StateValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Remembered subtree values, keyed by the full id of the owning node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryValue {
    entries: BTreeMap<String, StateValue>,
}

impl HistoryValue {
    /// An empty history: nothing has been exited yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// The remembered subtree value for `owner`, if it was ever exited.
    pub fn get(&self, owner: &str) -> Option<&StateValue> {
        self.entries.get(owner)
    }

    /// Record the pre-exit value of `owner`'s subtree, returning the
    /// updated history.
    pub fn record(&self, owner: impl Into<String>, value: StateValue) -> Self {
        let mut entries = self.entries.clone();
        entries.insert(owner.into(), value);
        Self { entries }
    }

    /// True when no subtree has ever been exited.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of remembered subtrees.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_history_is_empty() {
        let history = HistoryValue::new();
        assert!(history.is_empty());
        assert_eq!(history.get("payment.method"), None);
    }

    #[test]
    fn record_is_immutable() {
        let history = HistoryValue::new();
        let updated = history.record("payment.method", StateValue::from("check"));

        assert!(history.is_empty());
        assert_eq!(updated.len(), 1);
        assert_eq!(
            updated.get("payment.method"),
            Some(&StateValue::from("check"))
        );
    }

    #[test]
    fn later_records_overwrite() {
        let history = HistoryValue::new()
            .record("payment.method", StateValue::from("cash"))
            .record("payment.method", StateValue::from("check"));

        assert_eq!(history.len(), 1);
        assert_eq!(
            history.get("payment.method"),
            Some(&StateValue::from("check"))
        );
    }

    #[test]
    fn serde_round_trip() {
        let history = HistoryValue::new().record("a", StateValue::from("b.c"));
        let encoded = serde_json::to_string(&history).unwrap();
        let decoded: HistoryValue = serde_json::from_str(&encoded).unwrap();
        assert_eq!(history, decoded);
    }
}
