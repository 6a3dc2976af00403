// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::shape::Shape;

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// How messages on a topic are delivered to handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Fire-and-forget, any number of handlers.
    Broadcast,
    /// Synchronous call, exactly one result returned to the caller.
    RequestResponse,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Broadcast => "broadcast",
            Mode::RequestResponse => "request_response",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "broadcast" => Ok(Mode::Broadcast),
            "request_response" | "rpc" => Ok(Mode::RequestResponse),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// SchemaRecord
// ---------------------------------------------------------------------------

/// One registered `(topic, version)` schema.
///
/// `shape` never changes once stored; evolving a topic means registering a
/// new version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRecord {
    pub topic: String,
    pub version: String,
    pub shape: Shape,
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_shape: Option<Shape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_shape: Option<Shape>,
    /// Free-form identity of the owning publisher (module, service, ...).
    pub publisher: String,
    pub created_at: SystemTime,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation_reason: Option<String>,
}

impl SchemaRecord {
    pub fn key(&self) -> (&str, &str) {
        (&self.topic, &self.version)
    }
}

// ---------------------------------------------------------------------------
// NewSchema
// ---------------------------------------------------------------------------

/// Registration request for a schema.
#[derive(Debug, Clone)]
pub struct NewSchema {
    pub topic: String,
    pub version: String,
    pub shape: Shape,
    pub mode: Mode,
    pub publisher: String,
    pub response_shape: Option<Shape>,
    pub error_shape: Option<Shape>,
}

impl NewSchema {
    /// Broadcast schema with no publisher identity set.
    pub fn new(topic: impl Into<String>, version: impl Into<String>, shape: Shape) -> Self {
        Self {
            topic: topic.into(),
            version: version.into(),
            shape,
            mode: Mode::Broadcast,
            publisher: String::new(),
            response_shape: None,
            error_shape: None,
        }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = publisher.into();
        self
    }

    /// Success payload shape; only meaningful for request/response topics.
    pub fn response_shape(mut self, shape: Shape) -> Self {
        self.response_shape = Some(shape);
        self
    }

    /// Structured error shape; only meaningful for request/response topics.
    pub fn error_shape(mut self, shape: Shape) -> Self {
        self.error_shape = Some(shape);
        self
    }

    pub(crate) fn into_record(self) -> SchemaRecord {
        let (response_shape, error_shape) = match self.mode {
            Mode::RequestResponse => (self.response_shape, self.error_shape),
            Mode::Broadcast => (None, None),
        };
        SchemaRecord {
            topic: self.topic,
            version: self.version,
            shape: self.shape,
            mode: self.mode,
            response_shape,
            error_shape,
            publisher: self.publisher,
            created_at: SystemTime::now(),
            active: true,
            deprecation_reason: None,
        }
    }
}
