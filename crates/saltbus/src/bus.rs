// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The `Saltbus` facade: one registry, handler index, adapter table and
//! executor wired together from a [`SaltbusConfig`].

use std::sync::Arc;

use saltbus_schema_registry::{NewSchema, RegisterOutcome, RegistryError, SchemaRegistry};

use crate::adapter::AdapterRegistry;
use crate::config::SaltbusConfig;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::envelope;
use crate::error::Result;
use crate::executor::{TaskExecutor, WorkerPool};
use crate::handler::{HandlerRegistry, HandlerSpec, Registration};
use crate::message::InboundMessage;
use crate::publisher::{Publisher, Transport};

pub struct Saltbus {
    config: SaltbusConfig,
    registry: Arc<SchemaRegistry>,
    handlers: Arc<HandlerRegistry>,
    adapters: Arc<AdapterRegistry>,
    executor: Arc<dyn TaskExecutor>,
    transport: Option<Arc<dyn Transport>>,
    dispatcher: Dispatcher,
}

impl Saltbus {
    /// Build from configuration, opening the configured registry backend.
    /// Broadcast handlers run on a [`WorkerPool`] sized by `config.executor`.
    pub fn new(config: SaltbusConfig) -> Result<Self> {
        config.validate()?;
        let registry = config.registry.open().map_err(RegistryError::from)?;
        let executor = WorkerPool::new(&config.executor)?;
        Ok(Self::with_parts(config, Arc::new(registry), Arc::new(executor)))
    }

    /// Build around an existing registry and executor.
    pub fn with_parts(
        config: SaltbusConfig,
        registry: Arc<SchemaRegistry>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        let handlers = Arc::new(
            HandlerRegistry::new()
                .with_default_version(config.dispatch.default_subscribed_version.clone())
                .reject_duplicate_request_handlers(config.dispatch.reject_duplicate_request_handlers),
        );
        let adapters = Arc::new(AdapterRegistry::with_defaults());
        let dispatcher = Dispatcher::new(
            handlers.clone(),
            registry.clone(),
            adapters.clone(),
            executor.clone(),
            config.dispatch.clone(),
        );

        Self {
            config,
            registry,
            handlers,
            adapters,
            executor,
            transport: None,
            dispatcher,
        }
    }

    /// Transport used by publishers created afterwards.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn register_schema(&self, schema: NewSchema) -> Result<RegisterOutcome> {
        Ok(self.registry.register(schema)?)
    }

    /// Register a handler and record it as a subscriber of its pattern.
    pub fn register_handler(&self, spec: HandlerSpec) -> Result<Arc<Registration>> {
        let registration = self.handlers.register(spec)?;
        self.registry
            .track_subscriber(registration.pattern.as_str(), &registration.identity);
        Ok(registration)
    }

    pub fn dispatch(&self, message: InboundMessage) -> Result<DispatchOutcome> {
        self.dispatcher.dispatch(message)
    }

    /// Decode a wire envelope received on `topic` and dispatch it.
    pub fn dispatch_bytes(&self, topic: &str, bytes: &[u8]) -> Result<DispatchOutcome> {
        self.dispatch(envelope::decode(topic, bytes)?)
    }

    /// Publisher for `identity`, sharing this bus's registry and adapters.
    pub fn publisher(&self, identity: impl Into<String>) -> Publisher {
        let publisher = Publisher::new(identity, self.registry.clone(), self.adapters.clone());
        match &self.transport {
            Some(transport) => publisher.with_transport(transport.clone()),
            None => publisher,
        }
    }

    /// Retry registrations deferred while the store was unreachable.
    pub fn flush_pending(&self) -> saltbus_schema_registry::FlushReport {
        self.registry.flush_pending()
    }

    pub fn config(&self) -> &SaltbusConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    pub fn adapters(&self) -> &Arc<AdapterRegistry> {
        &self.adapters
    }

    pub fn executor(&self) -> &Arc<dyn TaskExecutor> {
        &self.executor
    }
}
