// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publishing side: validate outgoing data against the registry and hand
//! the encoded envelope to a [`Transport`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use saltbus_schema_registry::{Mode, NewSchema, RegistryError, SchemaRecord, SchemaRegistry};
use serde_json::Value;

use crate::adapter::{AdapterRegistry, SchemaSource, ValidationContext};
use crate::envelope;
use crate::error::{Error, Result};
use crate::message::{new_correlation_id, OutboundMessage};
use crate::topic::validate_topic;

/// Delivers encoded messages. Implemented by the embedding application.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, topic: &str, mode: Mode, body: Vec<u8>) -> Result<()>;
}

impl<F> Transport for F
where
    F: Fn(&str, Mode, Vec<u8>) -> Result<()> + Send + Sync + 'static,
{
    fn send(&self, topic: &str, mode: Mode, body: Vec<u8>) -> Result<()> {
        self(topic, mode, body)
    }
}

/// Validates and sends messages for one publishing identity.
pub struct Publisher {
    identity: String,
    registry: Arc<SchemaRegistry>,
    adapters: Arc<AdapterRegistry>,
    transport: Option<Arc<dyn Transport>>,
    declared: RwLock<HashMap<(String, String), NewSchema>>,
}

impl Publisher {
    pub fn new(
        identity: impl Into<String>,
        registry: Arc<SchemaRegistry>,
        adapters: Arc<AdapterRegistry>,
    ) -> Self {
        Self {
            identity: identity.into(),
            registry,
            adapters,
            transport: None,
            declared: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Remember a schema this publisher owns. It is registered on first
    /// use if the registry does not know it yet.
    pub fn declare(&self, schema: NewSchema) {
        let key = (schema.topic.clone(), schema.version.clone());
        self.declared.write().insert(key, schema);
    }

    /// Validate `data` for `topic`/`version` and build the outbound message.
    pub fn prepare(&self, topic: &str, version: &str, mode: Mode, data: Value) -> Result<OutboundMessage> {
        validate_topic(topic).map_err(Error::InvalidTopic)?;

        let record = self.resolve(topic, version)?;
        if record.mode != mode {
            tracing::warn!(
                "Publishing {} {} as {} but its schema is registered as {}",
                topic,
                record.version,
                mode,
                record.mode
            );
        }

        let source = SchemaSource::Shape(record.shape.clone());
        let ctx = ValidationContext {
            source: &source,
            topic,
            version: &record.version,
            handler: None,
        };
        let payload = self.adapters.validate(&data, &ctx)?;

        Ok(OutboundMessage {
            topic: topic.to_string(),
            version: record.version,
            mode,
            correlation_id: new_correlation_id(),
            payload,
        })
    }

    /// Validate, encode and send. Returns the correlation id.
    pub fn publish(&self, topic: &str, version: &str, mode: Mode, data: Value) -> Result<String> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| Error::Transport(format!("no transport configured for '{}'", self.identity)))?;

        let message = self.prepare(topic, version, mode, data)?;
        let body = envelope::encode(&message)?;
        transport.send(&message.topic, message.mode, body)?;

        tracing::info!(
            "Published {} {} ({}) correlation {}",
            message.topic,
            message.version,
            message.mode,
            message.correlation_id
        );
        Ok(message.correlation_id)
    }

    /// Registry lookup, registering a declared schema when the registry has
    /// never seen it.
    fn resolve(&self, topic: &str, version: &str) -> Result<SchemaRecord> {
        match self.registry.get_or_local(topic, version) {
            Ok(record) => Ok(record),
            Err(RegistryError::SchemaNotFound { .. }) => {
                let declared = self
                    .declared
                    .read()
                    .get(&(topic.to_string(), version.to_string()))
                    .cloned();
                let Some(mut schema) = declared else {
                    return Err(RegistryError::SchemaNotFound {
                        topic: topic.to_string(),
                        version: version.to_string(),
                    }
                    .into());
                };

                tracing::debug!("Registering declared schema {} {} on first publish", topic, version);
                if schema.publisher.is_empty() {
                    schema.publisher = self.identity.clone();
                }
                self.registry.register(schema)?;
                Ok(self.registry.get_or_local(topic, version)?)
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use saltbus_schema_registry::{FieldType, Shape};
    use serde_json::json;

    type Sent = Arc<Mutex<Vec<(String, Mode, Vec<u8>)>>>;

    fn order_schema() -> NewSchema {
        NewSchema::new(
            "orders.created",
            "v1",
            Shape::new()
                .field("order_id", FieldType::Integer)
                .optional("note", FieldType::String),
        )
    }

    fn publisher(registry: &Arc<SchemaRegistry>, sent: &Sent) -> Publisher {
        let sent = sent.clone();
        let transport = move |topic: &str, mode: Mode, body: Vec<u8>| -> Result<()> {
            sent.lock().push((topic.to_string(), mode, body));
            Ok(())
        };
        Publisher::new("orders-service", registry.clone(), Arc::new(AdapterRegistry::with_defaults()))
            .with_transport(Arc::new(transport))
    }

    #[test]
    fn prepare_validates_and_tags() {
        let registry = Arc::new(SchemaRegistry::in_memory());
        registry.register(order_schema()).unwrap();
        let p = publisher(&registry, &Sent::default());

        let msg = p
            .prepare("orders.created", "v1", Mode::Broadcast, json!({"order_id": 1, "extra": true}))
            .unwrap();
        assert_eq!(msg.version, "v1");
        assert_eq!(msg.payload, json!({"order_id": 1}));
        assert!(!msg.correlation_id.is_empty());

        let err = p
            .prepare("orders.created", "v1", Mode::Broadcast, json!({"note": "x"}))
            .unwrap_err();
        assert!(matches!(err, Error::ValidationFailed(_)));
    }

    #[test]
    fn latest_resolves_to_concrete_version() {
        let registry = Arc::new(SchemaRegistry::in_memory());
        registry.register(order_schema()).unwrap();
        registry
            .register(NewSchema::new(
                "orders.created",
                "v2",
                Shape::new().field("order_id", FieldType::Integer),
            ))
            .unwrap();
        let p = publisher(&registry, &Sent::default());

        let msg = p
            .prepare("orders.created", "latest", Mode::Broadcast, json!({"order_id": 1}))
            .unwrap();
        assert_eq!(msg.version, "v2");
    }

    #[test]
    fn declared_schema_registered_on_first_use() {
        let registry = Arc::new(SchemaRegistry::in_memory());
        let p = publisher(&registry, &Sent::default());

        let err = p
            .prepare("orders.created", "v1", Mode::Broadcast, json!({"order_id": 1}))
            .unwrap_err();
        assert!(matches!(err, Error::Registry(RegistryError::SchemaNotFound { .. })));

        p.declare(order_schema());
        p.prepare("orders.created", "v1", Mode::Broadcast, json!({"order_id": 1}))
            .unwrap();
        let record = registry.get("orders.created", "v1").unwrap();
        assert_eq!(record.publisher, "orders-service");
    }

    #[test]
    fn publish_sends_envelope() {
        let registry = Arc::new(SchemaRegistry::in_memory());
        registry.register(order_schema()).unwrap();
        let sent = Sent::default();
        let p = publisher(&registry, &sent);

        let id = p
            .publish("orders.created", "v1", Mode::Broadcast, json!({"order_id": 7}))
            .unwrap();

        let sent = sent.lock();
        assert_eq!(sent.len(), 1);
        let (topic, mode, body) = &sent[0];
        assert_eq!(topic, "orders.created");
        assert_eq!(*mode, Mode::Broadcast);

        let inbound = envelope::decode(topic, body).unwrap();
        assert_eq!(inbound.correlation_id, id);
        assert_eq!(inbound.version.as_deref(), Some("v1"));
    }

    #[test]
    fn publish_without_transport_fails() {
        let registry = Arc::new(SchemaRegistry::in_memory());
        registry.register(order_schema()).unwrap();
        let p = Publisher::new("svc", registry, Arc::new(AdapterRegistry::with_defaults()));
        let err = p
            .publish("orders.created", "v1", Mode::Broadcast, json!({"order_id": 1}))
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
