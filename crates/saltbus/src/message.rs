// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use saltbus_schema_registry::Mode;
use serde_json::Value;

use crate::error::{Error, Result};

/// Fresh correlation id (UUID v4).
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Payload as delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Encoded JSON.
    Bytes(Vec<u8>),
    /// Already-decoded structure.
    Map(Value),
}

impl Payload {
    pub fn into_value(self) -> Result<Value> {
        match self {
            Payload::Map(value) => Ok(value),
            Payload::Bytes(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::Envelope(format!("payload is not valid JSON: {}", e))),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Map(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

/// A message handed to the dispatcher, valid for one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub version: Option<String>,
    pub mode: Mode,
    pub correlation_id: String,
    pub payload: Payload,
}

impl InboundMessage {
    /// Untagged message with a fresh correlation id.
    pub fn new(topic: impl Into<String>, mode: Mode, payload: impl Into<Payload>) -> Self {
        Self {
            topic: topic.into(),
            version: None,
            mode,
            correlation_id: new_correlation_id(),
            payload: payload.into(),
        }
    }

    pub fn broadcast(topic: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self::new(topic, Mode::Broadcast, payload)
    }

    pub fn request(topic: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self::new(topic, Mode::RequestResponse, payload)
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }
}

/// A validated message ready for the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    /// Concrete version the payload was validated against.
    pub version: String,
    pub mode: Mode,
    pub correlation_id: String,
    pub payload: Value,
}

impl OutboundMessage {
    /// The same message as the receiving side sees it.
    pub fn to_inbound(&self) -> InboundMessage {
        InboundMessage {
            topic: self.topic.clone(),
            version: Some(self.version.clone()),
            mode: self.mode,
            correlation_id: self.correlation_id.clone(),
            payload: Payload::Map(self.payload.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bytes_payload_decodes() {
        let payload = Payload::from(br#"{"order_id": 1}"#.to_vec());
        assert_eq!(payload.into_value().unwrap(), json!({"order_id": 1}));

        let err = Payload::Bytes(b"not json".to_vec()).into_value().unwrap_err();
        assert!(matches!(err, Error::Envelope(_)));
    }

    #[test]
    fn builders() {
        let msg = InboundMessage::broadcast("orders.created", json!({}))
            .version("v2")
            .correlation_id("abc");
        assert_eq!(msg.mode, Mode::Broadcast);
        assert_eq!(msg.version.as_deref(), Some("v2"));
        assert_eq!(msg.correlation_id, "abc");

        let a = InboundMessage::request("rpc.x", json!({}));
        let b = InboundMessage::request("rpc.x", json!({}));
        assert_ne!(a.correlation_id, b.correlation_id);
    }
}
