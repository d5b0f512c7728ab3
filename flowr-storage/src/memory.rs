//! In-memory record store.

use crate::error::StoreError;
use crate::record::{validate_id, RecordKind, RecordStore};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

/// Record store that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<(RecordKind, String), Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl RecordStore for MemoryStore {
    fn put(&self, kind: RecordKind, id: &str, value: &Value) -> Result<(), StoreError> {
        validate_id(id)?;
        self.records
            .write()
            .insert((kind, id.to_string()), value.clone());
        Ok(())
    }

    fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Value>, StoreError> {
        validate_id(id)?;
        Ok(self.records.read().get(&(kind, id.to_string())).cloned())
    }

    fn delete(&self, kind: RecordKind, id: &str) -> Result<bool, StoreError> {
        validate_id(id)?;
        Ok(self
            .records
            .write()
            .remove(&(kind, id.to_string()))
            .is_some())
    }

    fn list(&self, kind: RecordKind) -> Result<Vec<(String, Value)>, StoreError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|((_, id), value)| (id.clone(), value.clone()))
            .collect())
    }
}
