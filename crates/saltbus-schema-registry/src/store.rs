// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Backing store abstraction
//!
//! The registry is storage-agnostic: anything that can insert a record only
//! if its `(topic, version)` key is absent, and read records back, will do.
//!
//! # Implementations
//!
//! - `MemoryStore` -- process-local, used in tests and single-process setups
//! - `FileStore` -- one JSON file per record on a shared filesystem
//! - `SqliteStore` -- SQLite table with a `(topic, version)` primary key
//!   (feature `sqlite`)

use thiserror::Error;

use crate::record::SchemaRecord;

/// Result of an atomic insert-if-absent.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// The record was stored.
    Inserted,
    /// A record already existed under that key; it is returned unchanged.
    Existing(SchemaRecord),
}

/// Store-level failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be reached right now; callers may retry later.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Persistent schema storage keyed by `(topic, version)`.
///
/// `insert_if_absent` must be atomic with respect to concurrent writers,
/// including writers in other processes sharing the same store.
pub trait SchemaStore: Send + Sync {
    /// Insert `record` unless its key is taken.
    fn insert_if_absent(&self, record: &SchemaRecord) -> Result<InsertOutcome, StoreError>;

    /// Read one record.
    fn get(&self, topic: &str, version: &str) -> Result<Option<SchemaRecord>, StoreError>;

    /// All records for a topic, in no particular order.
    fn versions(&self, topic: &str) -> Result<Vec<SchemaRecord>, StoreError>;

    /// Flip the `active` flag of a record.
    ///
    /// Returns `None` if the record does not exist, otherwise whether the
    /// flag actually changed.
    fn set_active(
        &self,
        topic: &str,
        version: &str,
        active: bool,
        reason: Option<&str>,
    ) -> Result<Option<bool>, StoreError>;

    /// Every topic with at least one record, sorted.
    fn topics(&self) -> Result<Vec<String>, StoreError>;
}
