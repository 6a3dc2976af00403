// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::record::SchemaRecord;
use crate::store::{InsertOutcome, SchemaStore, StoreError};

/// Process-local store keyed by `(topic, version)`.
///
/// Availability can be toggled to exercise the registry's degraded mode.
pub struct MemoryStore {
    records: RwLock<BTreeMap<(String, String), SchemaRecord>>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            records: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the store going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaStore for MemoryStore {
    fn insert_if_absent(&self, record: &SchemaRecord) -> Result<InsertOutcome, StoreError> {
        self.check()?;
        let mut records = self.records.write();
        let key = (record.topic.clone(), record.version.clone());
        if let Some(existing) = records.get(&key) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        records.insert(key, record.clone());
        Ok(InsertOutcome::Inserted)
    }

    fn get(&self, topic: &str, version: &str) -> Result<Option<SchemaRecord>, StoreError> {
        self.check()?;
        Ok(self
            .records
            .read()
            .get(&(topic.to_string(), version.to_string()))
            .cloned())
    }

    fn versions(&self, topic: &str) -> Result<Vec<SchemaRecord>, StoreError> {
        self.check()?;
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.topic == topic)
            .cloned()
            .collect())
    }

    fn set_active(
        &self,
        topic: &str,
        version: &str,
        active: bool,
        reason: Option<&str>,
    ) -> Result<Option<bool>, StoreError> {
        self.check()?;
        let mut records = self.records.write();
        match records.get_mut(&(topic.to_string(), version.to_string())) {
            None => Ok(None),
            Some(record) => {
                let changed = record.active != active;
                record.active = active;
                record.deprecation_reason = reason.map(str::to_string);
                Ok(Some(changed))
            }
        }
    }

    fn topics(&self) -> Result<Vec<String>, StoreError> {
        self.check()?;
        let mut topics: Vec<String> = self.records.read().keys().map(|(t, _)| t.clone()).collect();
        topics.dedup();
        Ok(topics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::NewSchema;
    use crate::shape::{FieldType, Shape};

    fn record(topic: &str, version: &str) -> SchemaRecord {
        NewSchema::new(topic, version, Shape::new().field("id", FieldType::Integer)).into_record()
    }

    #[test]
    fn insert_if_absent_keeps_first() {
        let store = MemoryStore::new();
        assert_eq!(
            store.insert_if_absent(&record("a.b", "v1")).unwrap(),
            InsertOutcome::Inserted
        );

        let mut other = record("a.b", "v1");
        other.publisher = "someone-else".into();
        match store.insert_if_absent(&other).unwrap() {
            InsertOutcome::Existing(existing) => assert_eq!(existing.publisher, ""),
            InsertOutcome::Inserted => panic!("second insert must not win"),
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn topics_are_sorted_and_unique() {
        let store = MemoryStore::new();
        store.insert_if_absent(&record("z.topic", "v1")).unwrap();
        store.insert_if_absent(&record("a.topic", "v1")).unwrap();
        store.insert_if_absent(&record("a.topic", "v2")).unwrap();
        assert_eq!(store.topics().unwrap(), vec!["a.topic", "z.topic"]);
        assert_eq!(store.versions("a.topic").unwrap().len(), 2);
    }

    #[test]
    fn offline_store_reports_unavailable() {
        let store = MemoryStore::new();
        store.set_available(false);
        let err = store.get("a.b", "v1").unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn set_active_reports_change() {
        let store = MemoryStore::new();
        store.insert_if_absent(&record("a.b", "v1")).unwrap();
        assert_eq!(store.set_active("a.b", "v1", false, Some("old")).unwrap(), Some(true));
        assert_eq!(store.set_active("a.b", "v1", false, None).unwrap(), Some(false));
        assert_eq!(store.set_active("a.b", "v9", false, None).unwrap(), None);
    }
}
