// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::record::SchemaRecord;
use crate::store::{InsertOutcome, SchemaStore, StoreError};

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// File-based schema store.
///
/// Stores each record as a JSON file at:
///   `{directory}/{topic}/{version}.json`
///
/// Topic and version are percent-encoded into path components, so distinct
/// keys never share a file and no key escapes the directory.
///
/// A new record is written to a private temp file and published with
/// `hard_link`, which fails if the target exists: two processes racing on
/// the same key on a shared filesystem produce exactly one winner, and a
/// record file is never visible half-written.
pub struct FileStore {
    directory: PathBuf,
    /// Serialises read-modify-write of the `active` flag within a process.
    update_lock: Mutex<()>,
}

impl FileStore {
    /// Create a new `FileStore` rooted at the given directory.
    ///
    /// The directory is created if it does not exist.
    pub fn new(directory: PathBuf) -> Result<Self, StoreError> {
        if !directory.exists() {
            fs::create_dir_all(&directory)?;
        }
        Ok(FileStore {
            directory,
            update_lock: Mutex::new(()),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The root vanishing (unmounted share, deleted volume) means the store
    /// is unreachable rather than empty.
    fn root(&self) -> Result<&Path, StoreError> {
        if self.directory.is_dir() {
            Ok(&self.directory)
        } else {
            Err(StoreError::Unavailable(format!(
                "schema directory {} is not reachable",
                self.directory.display()
            )))
        }
    }

    fn topic_dir(&self, topic: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root()?.join(encode_name(topic)?))
    }

    fn record_path(&self, topic: &str, version: &str) -> Result<PathBuf, StoreError> {
        Ok(self
            .topic_dir(topic)?
            .join(format!("{}.json", encode_name(version)?)))
    }

    fn read_record(path: &Path) -> Result<Option<SchemaRecord>, StoreError> {
        match fs::read_to_string(path) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read the record stored for `(topic, version)`, refusing a file that
    /// holds another key.
    fn read_keyed(path: &Path, topic: &str, version: &str) -> Result<Option<SchemaRecord>, StoreError> {
        match Self::read_record(path)? {
            Some(record) if record.topic != topic || record.version != version => {
                Err(StoreError::Backend(format!(
                    "{} holds {} {}, expected {} {}",
                    path.display(),
                    record.topic,
                    record.version,
                    topic,
                    version
                )))
            }
            other => Ok(other),
        }
    }

    /// Write `json` to a fresh temp file next to `path` and flush it.
    fn write_temp(path: &Path, json: &str) -> Result<PathBuf, StoreError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));
        let mut file = File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        Ok(tmp)
    }

    /// Publish `json` at `path` unless a file is already there.
    /// Returns `false` when `path` exists.
    fn publish_new(path: &Path, json: &str) -> Result<bool, StoreError> {
        let tmp = Self::write_temp(path, json)?;
        let linked = fs::hard_link(&tmp, path);
        if let Err(e) = fs::remove_file(&tmp) {
            tracing::debug!("Could not remove temp file {}: {}", tmp.display(), e);
        }
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn write_atomic(path: &Path, record: &SchemaRecord) -> Result<(), StoreError> {
        let tmp = Self::write_temp(path, &serde_json::to_string_pretty(record)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// An empty record file can only be left by a writer that created the
    /// file before filling it; clear it so the key can be inserted again.
    fn clear_if_empty(path: &Path) -> Result<bool, StoreError> {
        match fs::metadata(path) {
            Ok(meta) if meta.len() == 0 => {
                tracing::warn!("Removing empty schema file {}", path.display());
                match fs::remove_file(path) {
                    Ok(()) => Ok(true),
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
                    Err(e) => Err(e.into()),
                }
            }
            Ok(_) => Ok(false),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

impl SchemaStore for FileStore {
    fn insert_if_absent(&self, record: &SchemaRecord) -> Result<InsertOutcome, StoreError> {
        let path = self.record_path(&record.topic, &record.version)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(record)?;
        for _ in 0..2 {
            if Self::publish_new(&path, &json)? {
                return Ok(InsertOutcome::Inserted);
            }
            if Self::clear_if_empty(&path)? {
                continue;
            }
            if let Some(existing) = Self::read_keyed(&path, &record.topic, &record.version)? {
                return Ok(InsertOutcome::Existing(existing));
            }
        }
        Err(StoreError::Backend(format!(
            "could not insert {}: file keeps changing",
            path.display()
        )))
    }

    fn get(&self, topic: &str, version: &str) -> Result<Option<SchemaRecord>, StoreError> {
        let path = self.record_path(topic, version)?;
        Self::read_keyed(&path, topic, version)
    }

    fn versions(&self, topic: &str) -> Result<Vec<SchemaRecord>, StoreError> {
        let topic_dir = self.topic_dir(topic)?;
        let entries = match fs::read_dir(&topic_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(record) = Self::read_record(&path)? {
                if record.topic == topic {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    fn set_active(
        &self,
        topic: &str,
        version: &str,
        active: bool,
        reason: Option<&str>,
    ) -> Result<Option<bool>, StoreError> {
        let _guard = self.update_lock.lock();
        let path = self.record_path(topic, version)?;
        let Some(mut record) = Self::read_keyed(&path, topic, version)? else {
            return Ok(None);
        };

        let changed = record.active != active;
        record.active = active;
        record.deprecation_reason = reason.map(str::to_string);
        Self::write_atomic(&path, &record)?;
        Ok(Some(changed))
    }

    fn topics(&self) -> Result<Vec<String>, StoreError> {
        let mut topics = Vec::new();
        for entry in fs::read_dir(self.root()?)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            // Use the topic name from the records themselves (not dir name).
            for file in fs::read_dir(&path)? {
                let file = file?.path();
                if file.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                if let Some(record) = Self::read_record(&file)? {
                    topics.push(record.topic);
                    break;
                }
            }
        }
        topics.sort();
        topics.dedup();
        Ok(topics)
    }
}

/// Encode a topic or version as a single path component.
///
/// ASCII letters, digits, `-`, `_` and `.` are kept; every other byte
/// becomes `%XX`. Names made only of dots are fully encoded so they never
/// mean the current or parent directory.
fn encode_name(name: &str) -> Result<String, StoreError> {
    if name.is_empty() {
        return Err(StoreError::Backend("empty path component".to_string()));
    }
    if name.bytes().all(|b| b == b'.') {
        return Ok("%2E".repeat(name.len()));
    }

    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => out.push(byte as char),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
