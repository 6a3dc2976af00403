// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registry backend selection.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::memory::MemoryStore;
use crate::persistence::FileStore;
use crate::registry::{SchemaRegistry, DEFAULT_MAX_PENDING};
use crate::store::{SchemaStore, StoreError};

/// Which [`SchemaStore`] implementation backs the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    File,
    Sqlite,
}

/// Registry settings (the `[registry]` table of the saltbus config file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub backend: Backend,

    /// Directory (file backend) or database file (sqlite backend).
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Deferred registrations kept while the store is unreachable.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

fn default_path() -> PathBuf {
    PathBuf::from("schemas")
}

fn default_max_pending() -> usize {
    DEFAULT_MAX_PENDING
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            path: default_path(),
            max_pending: default_max_pending(),
        }
    }
}

impl RegistryConfig {
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Build the configured store.
    pub fn open_store(&self) -> Result<Arc<dyn SchemaStore>, StoreError> {
        match self.backend {
            Backend::Memory => Ok(Arc::new(MemoryStore::new())),
            Backend::File => Ok(Arc::new(FileStore::new(self.path.clone())?)),
            #[cfg(feature = "sqlite")]
            Backend::Sqlite => {
                let path = self.path.to_string_lossy();
                Ok(Arc::new(crate::sqlite::SqliteStore::new(&path)?))
            }
            #[cfg(not(feature = "sqlite"))]
            Backend::Sqlite => Err(StoreError::Backend(
                "sqlite backend requires the `sqlite` feature".to_string(),
            )),
        }
    }

    /// Build a registry over the configured store.
    pub fn open(&self) -> Result<SchemaRegistry, StoreError> {
        tracing::debug!(
            "Opening schema registry ({:?} backend at {})",
            self.backend,
            self.path.display()
        );
        Ok(SchemaRegistry::new(self.open_store()?).with_max_pending(self.max_pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::NewSchema;
    use crate::shape::{FieldType, Shape};

    #[test]
    fn defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.max_pending, 1024);
    }

    #[test]
    fn backend_deserializes_lowercase() {
        let config: RegistryConfig =
            serde_json::from_str(r#"{"backend": "file", "path": "/tmp/x"}"#).unwrap();
        assert_eq!(config.backend, Backend::File);
        assert_eq!(config.max_pending, 1024);
    }

    #[test]
    fn open_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RegistryConfig::default()
            .backend(Backend::File)
            .path(dir.path().join("schemas"))
            .open()
            .unwrap();

        registry
            .register(NewSchema::new("a.b", "v1", Shape::new().field("x", FieldType::Integer)))
            .unwrap();
        assert_eq!(registry.list_topics().unwrap(), vec!["a.b"]);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn open_sqlite_backend() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RegistryConfig::default()
            .backend(Backend::Sqlite)
            .path(dir.path().join("schemas.db"))
            .open()
            .unwrap();
        assert!(registry.list_topics().unwrap().is_empty());
    }
}
