// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::compatibility::check_compatibility;
use crate::error::RegistryError;
use crate::memory::MemoryStore;
use crate::record::{NewSchema, SchemaRecord};
use crate::shape::Shape;
use crate::store::{InsertOutcome, SchemaStore, StoreError};
use crate::version::{compare_versions, highest, is_numeric, LATEST};

/// Default bound of the deferred registration queue.
pub const DEFAULT_MAX_PENDING: usize = 1024;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of a `register` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterOutcome {
    /// A new record was written to the store by this call.
    pub created: bool,
    /// The store was unreachable; the record waits in the pending queue.
    pub deferred: bool,
    /// The stored shape, when the record already existed.
    pub existing_shape: Option<Shape>,
}

impl RegisterOutcome {
    fn created() -> Self {
        Self {
            created: true,
            deferred: false,
            existing_shape: None,
        }
    }

    fn existing(shape: Shape) -> Self {
        Self {
            created: false,
            deferred: false,
            existing_shape: Some(shape),
        }
    }

    fn deferred() -> Self {
        Self {
            created: false,
            deferred: true,
            existing_shape: None,
        }
    }
}

/// Result of draining the pending queue into the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Records now present in the store (written, or found identical).
    pub flushed: usize,
    /// `(topic, version)` keys that another writer claimed with a different shape.
    pub conflicts: Vec<(String, String)>,
    /// Records still waiting after this attempt.
    pub remaining: usize,
}

// ---------------------------------------------------------------------------
// SchemaRegistry
// ---------------------------------------------------------------------------

/// Versioned topic schemas on top of a shared [`SchemaStore`].
///
/// The store is the source of truth and the only place conflict detection
/// happens (its insert-if-absent is atomic).  On top of it the registry
/// keeps a process-local view: a cache of every record seen through it, a
/// bounded queue of registrations deferred while the store was unreachable,
/// and a diagnostic list of subscribers per topic.
pub struct SchemaRegistry {
    store: Arc<dyn SchemaStore>,
    pending: Mutex<VecDeque<SchemaRecord>>,
    local: RwLock<HashMap<(String, String), SchemaRecord>>,
    subscribers: RwLock<BTreeMap<String, Vec<String>>>,
    max_pending: usize,
}

impl SchemaRegistry {
    /// Create a registry backed by `store`.
    pub fn new(store: Arc<dyn SchemaStore>) -> Self {
        SchemaRegistry {
            store,
            pending: Mutex::new(VecDeque::new()),
            local: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(BTreeMap::new()),
            max_pending: DEFAULT_MAX_PENDING,
        }
    }

    /// Registry over a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Bound the pending queue (at least one entry is always kept).
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn SchemaStore> {
        &self.store
    }

    // -- registration --------------------------------------------------------

    /// Register a schema version.
    ///
    /// Identical re-registration is a no-op (`created == false`); a
    /// different shape under an existing key fails with
    /// [`RegistryError::SchemaConflict`].  An unreachable store never
    /// fails the call: the record is queued and `deferred` is set.
    pub fn register(&self, schema: NewSchema) -> Result<RegisterOutcome, RegistryError> {
        validate_key(&schema.topic, &schema.version)?;
        self.retry_pending();

        let record = schema.into_record();
        match self.store.insert_if_absent(&record) {
            Ok(InsertOutcome::Inserted) => {
                tracing::info!(
                    "Registered schema {} {} ({}, publisher '{}')",
                    record.topic,
                    record.version,
                    record.mode,
                    record.publisher
                );
                self.log_evolution(&record);
                self.cache(record);
                Ok(RegisterOutcome::created())
            }
            Ok(InsertOutcome::Existing(existing)) => {
                if existing.shape == record.shape {
                    tracing::debug!(
                        "Schema {} {} already registered with identical shape",
                        record.topic,
                        record.version
                    );
                    let shape = existing.shape.clone();
                    self.cache(existing);
                    Ok(RegisterOutcome::existing(shape))
                } else {
                    tracing::error!(
                        "Schema conflict for {} {}: registered by '{}', redefined by '{}'",
                        record.topic,
                        record.version,
                        existing.publisher,
                        record.publisher
                    );
                    Err(conflict(existing, record))
                }
            }
            Err(StoreError::Unavailable(reason)) => self.defer(record, &reason),
            Err(err) => Err(err.into()),
        }
    }

    fn defer(&self, record: SchemaRecord, reason: &str) -> Result<RegisterOutcome, RegistryError> {
        let key = (record.topic.clone(), record.version.clone());

        let known = self.local.read().get(&key).cloned();
        if let Some(known) = known {
            if known.shape != record.shape {
                return Err(conflict(known, record));
            }
            // Already queued, or already in the store from an earlier call.
            return Ok(RegisterOutcome::deferred());
        }

        tracing::warn!(
            "Schema registry unavailable ({}); deferring registration of {} {}",
            reason,
            record.topic,
            record.version
        );

        {
            let mut pending = self.pending.lock();
            if !pending.iter().any(|p| p.key() == record.key()) {
                while pending.len() >= self.max_pending {
                    if let Some(dropped) = pending.pop_front() {
                        self.local
                            .write()
                            .remove(&(dropped.topic.clone(), dropped.version.clone()));
                        tracing::warn!(
                            "Pending schema queue full ({}); dropping {} {}",
                            self.max_pending,
                            dropped.topic,
                            dropped.version
                        );
                    }
                }
                pending.push_back(record.clone());
            }
        }

        self.local.write().entry(key).or_insert(record);
        Ok(RegisterOutcome::deferred())
    }

    fn log_evolution(&self, record: &SchemaRecord) {
        let previous = match self.store.versions(&record.topic) {
            Ok(records) => records,
            Err(err) => {
                tracing::debug!("Skipping compatibility check for {}: {}", record.topic, err);
                return;
            }
        };

        let best = highest(
            previous
                .iter()
                .filter(|r| r.active && r.version != record.version)
                .map(|r| r.version.as_str()),
        );
        let Some(prior) = best.and_then(|v| previous.iter().find(|r| r.version == v)) else {
            return;
        };

        let result = check_compatibility(&prior.shape, &record.shape);
        if result.is_breaking() {
            tracing::warn!(
                "Schema {} {} is not compatible with {}: {}",
                record.topic,
                record.version,
                prior.version,
                result.details.join("; ")
            );
        } else {
            tracing::info!(
                "Schema {} {} is {:?} compatible with {}",
                record.topic,
                record.version,
                result.compatibility,
                prior.version
            );
        }
    }

    // -- pending queue -------------------------------------------------------

    /// Number of deferred registrations waiting for the store.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn retry_pending(&self) {
        if self.pending_count() > 0 {
            self.flush_pending();
        }
    }

    /// Push deferred registrations to the store, oldest first.
    ///
    /// Stops at the first record the store still cannot accept; that record
    /// and everything after it stay queued in their original order.
    pub fn flush_pending(&self) -> FlushReport {
        let mut queue = std::mem::take(&mut *self.pending.lock());
        let mut report = FlushReport::default();

        while let Some(record) = queue.pop_front() {
            match self.store.insert_if_absent(&record) {
                Ok(InsertOutcome::Inserted) => {
                    self.log_evolution(&record);
                    report.flushed += 1;
                }
                Ok(InsertOutcome::Existing(existing)) if existing.shape == record.shape => {
                    report.flushed += 1;
                }
                Ok(InsertOutcome::Existing(existing)) => {
                    tracing::error!(
                        "Deferred schema {} {} conflicts with the stored definition from '{}'",
                        record.topic,
                        record.version,
                        existing.publisher
                    );
                    report
                        .conflicts
                        .push((record.topic.clone(), record.version.clone()));
                    self.cache(existing);
                }
                Err(err) => {
                    tracing::debug!("Pending schema flush interrupted: {}", err);
                    queue.push_front(record);
                    break;
                }
            }
        }

        let mut pending = self.pending.lock();
        for record in queue.into_iter().rev() {
            pending.push_front(record);
        }
        report.remaining = pending.len();
        drop(pending);

        if report.flushed > 0 || !report.conflicts.is_empty() {
            tracing::info!(
                "Flushed {} pending schema(s), {} conflict(s), {} remaining",
                report.flushed,
                report.conflicts.len(),
                report.remaining
            );
        }
        report
    }

    // -- lookup --------------------------------------------------------------

    /// Fetch a record by explicit version or `"latest"`.
    ///
    /// `"latest"` resolves to the highest active numeric version; non-numeric
    /// and deprecated versions are only reachable explicitly.
    pub fn get(&self, topic: &str, version: &str) -> Result<SchemaRecord, RegistryError> {
        self.retry_pending();

        let found = if version == LATEST {
            let records = self.store.versions(topic)?;
            pick_latest(records)
        } else {
            self.store.get(topic, version)?
        };

        match found {
            Some(record) => {
                self.cache(record.clone());
                Ok(record)
            }
            None => Err(RegistryError::SchemaNotFound {
                topic: topic.to_string(),
                version: version.to_string(),
            }),
        }
    }

    /// Like [`get`](Self::get), but answers from the local view when the
    /// store is unreachable.
    pub fn get_or_local(&self, topic: &str, version: &str) -> Result<SchemaRecord, RegistryError> {
        match self.get(topic, version) {
            Err(RegistryError::RegistryUnavailable(reason)) => match self.local_get(topic, version) {
                Some(record) => {
                    tracing::warn!(
                        "Schema registry unavailable ({}); using locally known {} {}",
                        reason,
                        record.topic,
                        record.version
                    );
                    Ok(record)
                }
                None => Err(RegistryError::RegistryUnavailable(reason)),
            },
            other => other,
        }
    }

    /// Lookup in the process-local view only.
    pub fn local_get(&self, topic: &str, version: &str) -> Option<SchemaRecord> {
        let local = self.local.read();
        if version == LATEST {
            let candidates: Vec<SchemaRecord> = local
                .values()
                .filter(|r| r.topic == topic)
                .cloned()
                .collect();
            pick_latest(candidates)
        } else {
            local.get(&(topic.to_string(), version.to_string())).cloned()
        }
    }

    fn cache(&self, record: SchemaRecord) {
        self.local
            .write()
            .insert((record.topic.clone(), record.version.clone()), record);
    }

    // -- lifecycle -----------------------------------------------------------

    /// Mark a version inactive.  Returns whether anything changed.
    pub fn deprecate(&self, topic: &str, version: &str, reason: &str) -> Result<bool, RegistryError> {
        let changed = self
            .store
            .set_active(topic, version, false, Some(reason))?
            .ok_or_else(|| RegistryError::SchemaNotFound {
                topic: topic.to_string(),
                version: version.to_string(),
            })?;

        if let Some(record) = self
            .local
            .write()
            .get_mut(&(topic.to_string(), version.to_string()))
        {
            record.active = false;
            record.deprecation_reason = Some(reason.to_string());
        }

        if changed {
            tracing::info!("Deprecated schema {} {}: {}", topic, version, reason);
        }
        Ok(changed)
    }

    /// All topics with at least one stored schema, sorted.
    pub fn list_topics(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self.store.topics()?)
    }

    /// Versions of a topic: numeric ones in ascending order, then the
    /// non-numeric ones alphabetically.
    pub fn list_versions(&self, topic: &str) -> Result<Vec<String>, RegistryError> {
        let mut versions: Vec<String> = self
            .store
            .versions(topic)?
            .into_iter()
            .map(|r| r.version)
            .collect();
        versions.sort_by(|a, b| version_order(a, b));
        Ok(versions)
    }

    // -- subscribers ---------------------------------------------------------

    /// Remember that `handler` consumes `topic`.
    pub fn track_subscriber(&self, topic: &str, handler: &str) {
        let mut subscribers = self.subscribers.write();
        let list = subscribers.entry(topic.to_string()).or_default();
        if !list.iter().any(|h| h == handler) {
            list.push(handler.to_string());
        }
    }

    /// Handlers tracked for `topic`, in tracking order.
    pub fn subscribers(&self, topic: &str) -> Vec<String> {
        self.subscribers
            .read()
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_key(topic: &str, version: &str) -> Result<(), RegistryError> {
    if topic.trim().is_empty() {
        return Err(RegistryError::EmptyTopic);
    }
    if topic
        .split('.')
        .any(|segment| segment.is_empty() || segment.contains(['*', '#']))
    {
        return Err(RegistryError::InvalidTopic(topic.to_string()));
    }
    if version.trim().is_empty() || version == LATEST {
        return Err(RegistryError::InvalidVersion(version.to_string()));
    }
    Ok(())
}

fn conflict(existing: SchemaRecord, proposed: SchemaRecord) -> RegistryError {
    RegistryError::SchemaConflict {
        topic: proposed.topic,
        version: proposed.version,
        existing: Box::new(existing.shape),
        proposed: Box::new(proposed.shape),
    }
}

fn pick_latest(records: Vec<SchemaRecord>) -> Option<SchemaRecord> {
    let best = highest(
        records
            .iter()
            .filter(|r| r.active)
            .map(|r| r.version.as_str()),
    )?
    .to_string();
    records.into_iter().find(|r| r.version == best)
}

fn version_order(a: &str, b: &str) -> Ordering {
    match (is_numeric(a), is_numeric(b)) {
        (true, true) => compare_versions(a, b).unwrap_or(Ordering::Equal).then_with(|| a.cmp(b)),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Mode;
    use crate::shape::FieldType;

    fn order_shape() -> Shape {
        Shape::new()
            .field("order_id", FieldType::Integer)
            .field("total", FieldType::Number)
    }

    fn offline_registry() -> (Arc<MemoryStore>, SchemaRegistry) {
        let store = Arc::new(MemoryStore::new());
        let registry = SchemaRegistry::new(store.clone());
        (store, registry)
    }

    #[test]
    fn register_creates_then_is_idempotent() {
        let reg = SchemaRegistry::in_memory();
        let first = reg
            .register(NewSchema::new("orders.created", "v1", order_shape()))
            .unwrap();
        assert!(first.created);
        assert!(!first.deferred);

        let second = reg
            .register(NewSchema::new("orders.created", "v1", order_shape()))
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.existing_shape, Some(order_shape()));
    }

    #[test]
    fn different_shape_conflicts() {
        let reg = SchemaRegistry::in_memory();
        reg.register(NewSchema::new("orders.created", "v1", order_shape()))
            .unwrap();

        let other = order_shape().field("currency", FieldType::String);
        let err = reg
            .register(NewSchema::new("orders.created", "v1", other.clone()))
            .unwrap_err();
        match err {
            RegistryError::SchemaConflict {
                existing, proposed, ..
            } => {
                assert_eq!(*existing, order_shape());
                assert_eq!(*proposed, other);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn invalid_keys_rejected() {
        let reg = SchemaRegistry::in_memory();
        assert!(matches!(
            reg.register(NewSchema::new("", "v1", order_shape())),
            Err(RegistryError::EmptyTopic)
        ));
        assert!(matches!(
            reg.register(NewSchema::new("a.b", "latest", order_shape())),
            Err(RegistryError::InvalidVersion(_))
        ));
        for topic in ["orders.*", "orders.#", "orders..created", ".orders", "orders."] {
            assert!(
                matches!(
                    reg.register(NewSchema::new(topic, "v1", order_shape())),
                    Err(RegistryError::InvalidTopic(_))
                ),
                "{} should be rejected",
                topic
            );
        }
        assert!(reg.list_topics().unwrap().is_empty());
    }

    #[test]
    fn latest_uses_numeric_order_and_skips_deprecated() {
        let reg = SchemaRegistry::in_memory();
        for v in ["v1", "v2", "v10", "beta"] {
            reg.register(NewSchema::new("t.x", v, order_shape())).unwrap();
        }
        assert_eq!(reg.get("t.x", LATEST).unwrap().version, "v10");

        assert!(reg.deprecate("t.x", "v10", "rolled back").unwrap());
        assert_eq!(reg.get("t.x", LATEST).unwrap().version, "v2");

        // Deprecated and non-numeric versions stay reachable explicitly.
        assert!(!reg.get("t.x", "v10").unwrap().active);
        assert_eq!(reg.get("t.x", "beta").unwrap().version, "beta");
    }

    #[test]
    fn missing_schema_is_not_found() {
        let reg = SchemaRegistry::in_memory();
        assert!(reg.get("nope", "v1").unwrap_err().is_not_found());
        assert!(reg.get("nope", LATEST).unwrap_err().is_not_found());
        assert!(reg.deprecate("nope", "v1", "x").unwrap_err().is_not_found());
    }

    #[test]
    fn deprecate_twice_reports_no_change() {
        let reg = SchemaRegistry::in_memory();
        reg.register(NewSchema::new("a.b", "v1", order_shape())).unwrap();
        assert!(reg.deprecate("a.b", "v1", "old").unwrap());
        assert!(!reg.deprecate("a.b", "v1", "old").unwrap());
    }

    #[test]
    fn unavailable_store_defers_and_flushes() {
        let (store, reg) = offline_registry();
        store.set_available(false);

        let outcome = reg
            .register(NewSchema::new("orders.created", "v1", order_shape()))
            .unwrap();
        assert!(outcome.deferred);
        assert!(!outcome.created);
        assert_eq!(reg.pending_count(), 1);

        // Re-registering while still offline does not queue twice.
        reg.register(NewSchema::new("orders.created", "v1", order_shape()))
            .unwrap();
        assert_eq!(reg.pending_count(), 1);

        assert!(reg.get("orders.created", "v1").unwrap_err().is_unavailable());
        let local = reg.get_or_local("orders.created", "v1").unwrap();
        assert_eq!(local.shape, order_shape());

        store.set_available(true);
        let report = reg.flush_pending();
        assert_eq!(report.flushed, 1);
        assert_eq!(report.remaining, 0);
        assert!(report.conflicts.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn next_call_flushes_pending() {
        let (store, reg) = offline_registry();
        store.set_available(false);
        reg.register(NewSchema::new("a.one", "v1", order_shape())).unwrap();

        store.set_available(true);
        let outcome = reg
            .register(NewSchema::new("a.two", "v1", order_shape()))
            .unwrap();
        assert!(outcome.created);
        assert_eq!(reg.pending_count(), 0);
        assert!(reg.get("a.one", "v1").is_ok());
    }

    #[test]
    fn deferred_conflict_detected_locally() {
        let (store, reg) = offline_registry();
        store.set_available(false);
        reg.register(NewSchema::new("a.b", "v1", order_shape())).unwrap();

        let err = reg
            .register(NewSchema::new(
                "a.b",
                "v1",
                Shape::new().field("other", FieldType::Boolean),
            ))
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn flush_reports_conflicts_from_other_writers() {
        let store = Arc::new(MemoryStore::new());
        let ours = SchemaRegistry::new(store.clone());
        let theirs = SchemaRegistry::new(store.clone());

        store.set_available(false);
        ours.register(NewSchema::new("a.b", "v1", order_shape())).unwrap();
        store.set_available(true);

        theirs
            .register(NewSchema::new(
                "a.b",
                "v1",
                Shape::new().field("other", FieldType::Boolean),
            ))
            .unwrap();

        let report = ours.flush_pending();
        assert_eq!(report.conflicts, vec![("a.b".to_string(), "v1".to_string())]);
        assert_eq!(report.remaining, 0);
    }

    #[test]
    fn pending_queue_is_bounded() {
        let store = Arc::new(MemoryStore::new());
        let reg = SchemaRegistry::new(store.clone()).with_max_pending(2);
        store.set_available(false);

        for topic in ["a.one", "a.two", "a.three"] {
            reg.register(NewSchema::new(topic, "v1", order_shape())).unwrap();
        }
        assert_eq!(reg.pending_count(), 2);

        store.set_available(true);
        reg.flush_pending();
        assert_eq!(reg.list_topics().unwrap(), vec!["a.three", "a.two"]);
    }

    #[test]
    fn list_versions_orders_numeric_first() {
        let reg = SchemaRegistry::in_memory();
        for v in ["v10", "beta", "v2", "v1"] {
            reg.register(NewSchema::new("a.b", v, order_shape())).unwrap();
        }
        assert_eq!(reg.list_versions("a.b").unwrap(), vec!["v1", "v2", "v10", "beta"]);
    }

    #[test]
    fn request_response_shapes_are_kept() {
        let reg = SchemaRegistry::in_memory();
        let error_shape = Shape::new().field("error_code", FieldType::String);
        reg.register(
            NewSchema::new("rpc.orders.get", "v1", order_shape())
                .mode(Mode::RequestResponse)
                .response_shape(order_shape())
                .error_shape(error_shape.clone()),
        )
        .unwrap();

        let record = reg.get("rpc.orders.get", LATEST).unwrap();
        assert_eq!(record.mode, Mode::RequestResponse);
        assert_eq!(record.error_shape, Some(error_shape));
    }

    #[test]
    fn subscribers_are_tracked_once() {
        let reg = SchemaRegistry::in_memory();
        reg.track_subscriber("orders.created", "billing::on_order");
        reg.track_subscriber("orders.created", "billing::on_order");
        reg.track_subscriber("orders.created", "mail::confirm");
        assert_eq!(
            reg.subscribers("orders.created"),
            vec!["billing::on_order", "mail::confirm"]
        );
        assert!(reg.subscribers("users.signup").is_empty());
    }

    #[test]
    fn concurrent_registration_creates_once() {
        let reg = Arc::new(SchemaRegistry::in_memory());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = reg.clone();
                std::thread::spawn(move || {
                    reg.register(NewSchema::new("orders.created", "v1", order_shape()))
                        .unwrap()
                        .created
                })
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|c| *c)
            .count();
        assert_eq!(created, 1);
    }
}
