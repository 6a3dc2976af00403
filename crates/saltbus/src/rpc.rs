// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Application-level errors for request/response topics.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured error returned by a request/response handler.
///
/// This is data, not an infrastructure failure: the dispatcher hands it
/// back to the caller (validated against the topic's error shape when one
/// is registered).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub error_code: String,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl RpcError {
    pub fn new(error_code: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            error_message: error_message.into(),
            details: None,
        }
    }

    /// Attach free-form details.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Wire representation: `{error_code, error_message, details?}`.
    pub fn to_response_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("error_code".into(), Value::String(self.error_code.clone()));
        obj.insert(
            "error_message".into(),
            Value::String(self.error_message.clone()),
        );
        if let Some(details) = &self.details {
            obj.insert("details".into(), details.clone());
        }
        Value::Object(obj)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_code, self.error_message)
    }
}

impl std::error::Error for RpcError {}
