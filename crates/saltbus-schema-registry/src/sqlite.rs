// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite schema store
//!
//! Shared registry storage for processes on the same host (or a shared
//! volume).  The `(topic, version)` primary key is what makes concurrent
//! registration safe: the losing writer sees its insert ignored and reads
//! back the winner's record.

use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::record::SchemaRecord;
use crate::store::{InsertOutcome, SchemaStore, StoreError};

/// SQLite-backed schema store.
///
/// Thread-safe via internal Mutex (SQLite Connection is not Sync).
///
/// # Schema
///
/// ```sql
/// CREATE TABLE schemas (
///     topic TEXT NOT NULL,
///     version TEXT NOT NULL,
///     active INTEGER NOT NULL,
///     record TEXT NOT NULL,
///     PRIMARY KEY (topic, version)
/// );
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a file-based database.
    pub fn new(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(map_sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(map_sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schemas (
                topic TEXT NOT NULL,
                version TEXT NOT NULL,
                active INTEGER NOT NULL,
                record TEXT NOT NULL,
                PRIMARY KEY (topic, version)
            )",
            [],
        )
        .map_err(map_sqlite)?;
        Ok(())
    }

    fn load(conn: &Connection, topic: &str, version: &str) -> Result<Option<SchemaRecord>, StoreError> {
        let json: Option<String> = conn
            .query_row(
                "SELECT record FROM schemas WHERE topic = ?1 AND version = ?2",
                params![topic, version],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sqlite)?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

/// Busy, locked or unopenable databases are transient: report them as
/// unavailable so the registry can defer instead of failing.
fn map_sqlite(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(
                e.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
            ) =>
        {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Backend(err.to_string()),
    }
}

impl SchemaStore for SqliteStore {
    fn insert_if_absent(&self, record: &SchemaRecord) -> Result<InsertOutcome, StoreError> {
        let json = serde_json::to_string(record)?;
        let conn = self.conn.lock();

        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO schemas (topic, version, active, record)
                 VALUES (?1, ?2, ?3, ?4)",
                params![record.topic, record.version, record.active, json],
            )
            .map_err(map_sqlite)?;

        if inserted == 1 {
            return Ok(InsertOutcome::Inserted);
        }

        match Self::load(&conn, &record.topic, &record.version)? {
            Some(existing) => Ok(InsertOutcome::Existing(existing)),
            None => Err(StoreError::Backend(format!(
                "insert of {}/{} ignored but no row found",
                record.topic, record.version
            ))),
        }
    }

    fn get(&self, topic: &str, version: &str) -> Result<Option<SchemaRecord>, StoreError> {
        let conn = self.conn.lock();
        Self::load(&conn, topic, version)
    }

    fn versions(&self, topic: &str) -> Result<Vec<SchemaRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT record FROM schemas WHERE topic = ?1")
            .map_err(map_sqlite)?;
        let rows = stmt
            .query_map([topic], |row| row.get::<_, String>(0))
            .map_err(map_sqlite)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlite)?;

        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(StoreError::from))
            .collect()
    }

    fn set_active(
        &self,
        topic: &str,
        version: &str,
        active: bool,
        reason: Option<&str>,
    ) -> Result<Option<bool>, StoreError> {
        let conn = self.conn.lock();
        let Some(mut record) = Self::load(&conn, topic, version)? else {
            return Ok(None);
        };

        let changed = record.active != active;
        record.active = active;
        record.deprecation_reason = reason.map(str::to_string);
        conn.execute(
            "UPDATE schemas SET active = ?3, record = ?4 WHERE topic = ?1 AND version = ?2",
            params![topic, version, active, serde_json::to_string(&record)?],
        )
        .map_err(map_sqlite)?;
        Ok(Some(changed))
    }

    fn topics(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT DISTINCT topic FROM schemas ORDER BY topic")
            .map_err(map_sqlite)?;
        let topics = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(map_sqlite)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlite)?;
        Ok(topics)
    }
}
