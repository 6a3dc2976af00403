// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Explicit start-up phase.
//!
//! Schemas and handlers are collected up front and registered in one
//! `init` call, schemas first, before the process starts consuming.

use saltbus_schema_registry::NewSchema;

use crate::bus::Saltbus;
use crate::error::Result;
use crate::handler::HandlerSpec;

/// A schema a service owns.
pub type SchemaDefinition = NewSchema;

/// A handler a service provides.
pub type HandlerDefinition = HandlerSpec;

/// What `init` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub schemas_created: usize,
    pub schemas_existing: usize,
    pub schemas_deferred: usize,
    pub handlers_registered: usize,
}

#[derive(Debug, Default)]
pub struct Bootstrap {
    schemas: Vec<SchemaDefinition>,
    handlers: Vec<HandlerDefinition>,
}

impl Bootstrap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(mut self, schema: SchemaDefinition) -> Self {
        self.schemas.push(schema);
        self
    }

    pub fn handler(mut self, handler: HandlerDefinition) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Register everything against `bus`, stopping at the first error.
    ///
    /// A `SchemaConflict` aborts before any handler is registered.
    pub fn init(self, bus: &Saltbus) -> Result<BootstrapReport> {
        let mut report = BootstrapReport::default();

        for schema in self.schemas {
            let outcome = bus.register_schema(schema)?;
            if outcome.created {
                report.schemas_created += 1;
            } else if outcome.deferred {
                report.schemas_deferred += 1;
            } else {
                report.schemas_existing += 1;
            }
        }

        for handler in self.handlers {
            bus.register_handler(handler)?;
            report.handlers_registered += 1;
        }

        tracing::info!(
            "Bootstrap complete: {} schema(s) created, {} existing, {} deferred, {} handler(s)",
            report.schemas_created,
            report.schemas_existing,
            report.schemas_deferred,
            report.handlers_registered
        );
        Ok(report)
    }
}
