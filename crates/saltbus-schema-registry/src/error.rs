// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use thiserror::Error;

use crate::shape::Shape;
use crate::store::StoreError;

/// Errors produced by the schema registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// `(topic, version)` already exists with a different shape.
    ///
    /// Both shapes are carried so the registering process can report
    /// exactly what diverged.
    #[error("schema conflict for {topic} {version}: existing shape differs from the proposed one")]
    SchemaConflict {
        topic: String,
        version: String,
        existing: Box<Shape>,
        proposed: Box<Shape>,
    },

    #[error("schema not found: {topic} {version}")]
    SchemaNotFound { topic: String, version: String },

    /// The backing store could not be reached.
    #[error("schema registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("invalid schema version '{0}'")]
    InvalidVersion(String),

    #[error("topic must not be empty")]
    EmptyTopic,

    /// Not a concrete dot-delimited topic (empty segment or wildcard).
    #[error("invalid topic '{0}'")]
    InvalidTopic(String),

    #[error(transparent)]
    Store(StoreError),
}

impl RegistryError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, RegistryError::SchemaConflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::SchemaNotFound { .. })
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, RegistryError::RegistryUnavailable(_))
    }
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => RegistryError::RegistryUnavailable(msg),
            other => RegistryError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_store_maps_to_registry_unavailable() {
        let err: RegistryError = StoreError::Unavailable("down".into()).into();
        assert!(err.is_unavailable());

        let err: RegistryError = StoreError::Backend("disk full".into()).into();
        assert!(matches!(err, RegistryError::Store(_)));
    }

    #[test]
    fn display_names_topic_and_version() {
        let err = RegistryError::SchemaNotFound {
            topic: "orders.created".into(),
            version: "v3".into(),
        };
        assert_eq!(err.to_string(), "schema not found: orders.created v3");
    }
}
