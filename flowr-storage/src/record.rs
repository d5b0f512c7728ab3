//! Record kinds and the store boundary.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    RuleSet,
    Flow,
    State,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [RecordKind::RuleSet, RecordKind::Flow, RecordKind::State];

    /// Directory/collection name for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::RuleSet => "rule_sets",
            RecordKind::Flow => "flows",
            RecordKind::State => "states",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable store for JSON records keyed by kind and id.
///
/// Every call is one atomic write: after `put` returns, readers observe
/// either the previous record or the new one, never a mix.
pub trait RecordStore: Send + Sync {
    /// Creates or replaces a record.
    fn put(&self, kind: RecordKind, id: &str, value: &Value) -> Result<(), StoreError>;

    /// Fetches a record.
    fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Value>, StoreError>;

    /// Deletes a record. Returns false if it did not exist.
    fn delete(&self, kind: RecordKind, id: &str) -> Result<bool, StoreError>;

    /// Lists all records of a kind, ordered by id.
    fn list(&self, kind: RecordKind) -> Result<Vec<(String, Value)>, StoreError>;
}

/// Rejects ids that are empty or could escape a directory.
pub(crate) fn validate_id(id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("6f1c2d3e-aaaa-4bbb-8ccc-000000000001").is_ok());
        assert!(validate_id("flow_1").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("../etc").is_err());
        assert!(validate_id("a/b").is_err());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(RecordKind::RuleSet.to_string(), "rule_sets");
        assert_eq!(RecordKind::Flow.as_str(), "flows");
        assert_eq!(RecordKind::State.as_str(), "states");
    }
}
