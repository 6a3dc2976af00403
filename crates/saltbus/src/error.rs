// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use saltbus_schema_registry::{RegistryError, ValidationError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::topic::TopicError;

/// Result type for saltbus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Saltbus errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("schema registry error: {0}")]
    Registry(#[from] RegistryError),

    /// No validator adapter understands the schema source.
    #[error("no validator adapter for schema source '{0}'")]
    NoAdapterFound(String),

    #[error("validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    #[error("invalid topic: {0}")]
    InvalidTopic(TopicError),

    #[error("invalid topic pattern: {0}")]
    InvalidPattern(TopicError),

    #[error("handler '{handler}' is already registered for '{pattern}'")]
    DuplicateHandler { pattern: String, handler: String },

    #[error("request/response topic '{pattern}' already has handler '{existing}'")]
    DuplicateRequestHandler { pattern: String, existing: String },

    /// A request/response handler failed outside the structured error path.
    #[error("handler '{handler}' failed: {message}")]
    HandlerFailed { handler: String, message: String },

    #[error("scheduling failed: {0}")]
    Schedule(String),

    #[error("envelope error: {0}")]
    Envelope(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Envelope(err.to_string())
    }
}
