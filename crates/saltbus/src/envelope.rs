// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! JSON wire envelope.
//!
//! ```json
//! {
//!   "order_id": 1,
//!   "total": 9.99,
//!   "_salt_meta": {"mode": "broadcast", "version": "v1", "correlation_id": "..."}
//! }
//! ```
//!
//! Messages without `_salt_meta` come from legacy publishers and are read as
//! untagged request/response messages with a fresh correlation id.

use saltbus_schema_registry::Mode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::message::{new_correlation_id, InboundMessage, OutboundMessage, Payload};

/// Reserved payload key carrying routing metadata.
pub const META_KEY: &str = "_salt_meta";

#[derive(Debug, Serialize, Deserialize)]
struct Meta {
    mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default)]
    correlation_id: Option<String>,
}

/// Serialize an outbound message.
pub fn encode(message: &OutboundMessage) -> Result<Vec<u8>> {
    let Value::Object(mut body) = message.payload.clone() else {
        return Err(Error::Envelope(format!(
            "payload for {} must be a JSON object",
            message.topic
        )));
    };
    if body.contains_key(META_KEY) {
        return Err(Error::Envelope(format!("payload must not contain '{}'", META_KEY)));
    }

    let meta = Meta {
        mode: message.mode,
        version: Some(message.version.clone()),
        correlation_id: Some(message.correlation_id.clone()),
    };
    body.insert(META_KEY.to_string(), serde_json::to_value(meta)?);
    Ok(serde_json::to_vec(&Value::Object(body))?)
}

/// Parse bytes received on `topic`.
pub fn decode(topic: &str, bytes: &[u8]) -> Result<InboundMessage> {
    let value: Value = serde_json::from_slice(bytes)?;
    let Value::Object(mut body) = value else {
        return Err(Error::Envelope(format!("message on {} is not a JSON object", topic)));
    };

    let (mode, version, correlation_id) = match body.remove(META_KEY) {
        Some(meta) => {
            let meta: Meta = serde_json::from_value(meta)
                .map_err(|e| Error::Envelope(format!("invalid {}: {}", META_KEY, e)))?;
            (meta.mode, meta.version, meta.correlation_id)
        }
        None => {
            tracing::debug!("Message on {} has no {}; treating as request/response", topic, META_KEY);
            (Mode::RequestResponse, None, None)
        }
    };

    Ok(InboundMessage {
        topic: topic.to_string(),
        version,
        mode,
        correlation_id: correlation_id.unwrap_or_else(new_correlation_id),
        payload: Payload::Map(Value::Object(body)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outbound() -> OutboundMessage {
        OutboundMessage {
            topic: "orders.created".into(),
            version: "v1".into(),
            mode: Mode::Broadcast,
            correlation_id: "c-1".into(),
            payload: json!({"order_id": 1, "total": 9.99}),
        }
    }

    #[test]
    fn meta_is_carried_and_stripped() {
        let bytes = encode(&outbound()).unwrap();
        let raw: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(raw[META_KEY]["mode"], "broadcast");
        assert_eq!(raw[META_KEY]["version"], "v1");

        let inbound = decode("orders.created", &bytes).unwrap();
        assert_eq!(inbound.version.as_deref(), Some("v1"));
        assert_eq!(inbound.correlation_id, "c-1");
        assert_eq!(inbound.mode, Mode::Broadcast);
        assert_eq!(
            inbound.payload,
            Payload::Map(json!({"order_id": 1, "total": 9.99}))
        );
    }

    #[test]
    fn legacy_messages_are_request_response() {
        let inbound = decode("rpc.orders.get", br#"{"order_id": 7}"#).unwrap();
        assert_eq!(inbound.mode, Mode::RequestResponse);
        assert!(inbound.version.is_none());
        assert!(!inbound.correlation_id.is_empty());
    }

    #[test]
    fn rejects_non_objects() {
        let mut msg = outbound();
        msg.payload = json!([1, 2, 3]);
        assert!(matches!(encode(&msg), Err(Error::Envelope(_))));
        assert!(matches!(decode("a.b", b"[1]"), Err(Error::Envelope(_))));
        assert!(decode("a.b", br#"{"_salt_meta": {"mode": "fanout"}}"#).is_err());
    }
}
