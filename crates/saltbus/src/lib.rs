// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Saltbus Event Dispatch
//!
//! Topic-based event dispatch with versioned schemas.
//!
//! # Features
//!
//! - **Topic Patterns**: `*` matches one segment, `#` zero or more trailing ones
//! - **Schema Versions**: subscribers pin a version or follow `latest`
//! - **Dispatch Modes**: request/response (first eligible handler answers)
//!   and broadcast (every eligible handler, deduplicated per message)
//! - **Degraded Registry**: registrations are queued while the store is down
//!
//! # Quick Start
//!
//! ```no_run
//! use saltbus::{
//!     Bootstrap, FieldType, HandlerContext, HandlerError, HandlerSpec, InboundMessage,
//!     NewSchema, Saltbus, SaltbusConfig, Shape,
//! };
//! use serde_json::{json, Value};
//!
//! let bus = Saltbus::new(SaltbusConfig::default())?;
//! Bootstrap::new()
//!     .schema(NewSchema::new(
//!         "orders.created",
//!         "v1",
//!         Shape::new().field("order_id", FieldType::Integer),
//!     ))
//!     .handler(HandlerSpec::new(
//!         "orders.*",
//!         "billing",
//!         |_ctx: &HandlerContext, order: Value| -> Result<Value, HandlerError> {
//!             println!("billing {}", order["order_id"]);
//!             Ok(Value::Null)
//!         },
//!     ))
//!     .init(&bus)?;
//!
//! bus.dispatch(InboundMessage::broadcast("orders.created", json!({"order_id": 1})).version("v1"))?;
//! # Ok::<(), saltbus::Error>(())
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! [dispatch]
//! default_subscribed_version = "latest"
//! allow_unregistered_schemas = false
//!
//! [registry]
//! backend = "sqlite"
//! path = "schemas.db"
//! ```

pub mod adapter;
pub mod bootstrap;
pub mod bus;
pub mod compat;
pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod handler;
pub mod message;
pub mod publisher;
pub mod rpc;
pub mod topic;

pub use adapter::{
    AdapterRegistry, JsonSchemaAdapter, SchemaSource, ShapeAdapter, TypedAdapter, ValidationContext,
    ValidatorAdapter,
};
pub use bootstrap::{Bootstrap, BootstrapReport, HandlerDefinition, SchemaDefinition};
pub use bus::Saltbus;
pub use compat::Eligibility;
pub use config::{ConfigError, DispatchConfig, ExecutorConfig, SaltbusConfig};
pub use dispatcher::{
    CompletionRecord, DispatchOutcome, DispatchResult, DispatchStatus, Dispatcher, HandlerReport,
    HandlerStatus, StaleSubscriber,
};
pub use error::{Error, Result};
pub use executor::{dedup_key, InlineExecutor, Task, TaskExecutor, TaskRef, WorkerPool};
pub use handler::{Handler, HandlerContext, HandlerError, HandlerRegistry, HandlerSpec, Registration};
pub use message::{InboundMessage, OutboundMessage, Payload};
pub use publisher::{Publisher, Transport};
pub use rpc::RpcError;
pub use topic::{TopicError, TopicPattern};

pub use saltbus_schema_registry::{
    Backend, FieldType, Mode, NewSchema, RegistryConfig, RegistryError, SchemaRecord,
    SchemaRegistry, Shape, SubscribedVersion, ValidationError, LATEST,
};
