// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Validator adapter selection.
//!
//! Payloads can be described by a registry [`Shape`], a JSON-Schema
//! document, or a Rust type.  Each description is handled by an adapter;
//! the [`AdapterRegistry`] picks the first one (by descending priority,
//! then registration order) that claims the source.

use std::any::{type_name, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;
use saltbus_schema_registry::{Shape, ValidationError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Priority given to [`ShapeAdapter`] by [`AdapterRegistry::with_defaults`].
pub const SHAPE_PRIORITY: i32 = 100;
/// Priority given to [`JsonSchemaAdapter`] by [`AdapterRegistry::with_defaults`].
pub const JSON_SCHEMA_PRIORITY: i32 = 50;
/// Priority used by [`AdapterRegistry::register_type`].
pub const TYPED_PRIORITY: i32 = 200;

// ---------------------------------------------------------------------------
// SchemaSource
// ---------------------------------------------------------------------------

/// Whatever defines the structure of a payload.
#[derive(Debug, Clone)]
pub enum SchemaSource {
    /// Structural shape, as stored in the registry.
    Shape(Shape),
    /// JSON-Schema-style document.
    JsonSchema(Value),
    /// A Rust type validated through serde.
    Rust {
        type_id: TypeId,
        type_name: &'static str,
    },
}

impl SchemaSource {
    /// Source for the Rust type `T`.
    pub fn of<T: 'static>() -> Self {
        Self::Rust {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }
}

impl fmt::Display for SchemaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shape(shape) => match &shape.title {
                Some(title) => write!(f, "shape {}", title),
                None => write!(f, "shape ({} fields)", shape.fields.len()),
            },
            Self::JsonSchema(_) => write!(f, "json-schema document"),
            Self::Rust { type_name, .. } => write!(f, "type {}", type_name),
        }
    }
}

/// Where a validation happens, for adapters that want it (and for logs).
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub source: &'a SchemaSource,
    pub topic: &'a str,
    pub version: &'a str,
    /// Handler identity on the consuming side, `None` when publishing.
    pub handler: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// ValidatorAdapter
// ---------------------------------------------------------------------------

/// Validation strategy for one kind of [`SchemaSource`].
pub trait ValidatorAdapter: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Whether this adapter understands `source`.
    fn can_handle(&self, source: &SchemaSource) -> bool;

    /// Validate `raw` against `ctx.source`, returning the normalised data.
    fn validate(&self, raw: &Value, ctx: &ValidationContext<'_>) -> std::result::Result<Value, ValidationError>;
}

/// Validates against a registry [`Shape`] by walking it.
#[derive(Debug, Default)]
pub struct ShapeAdapter;

impl ValidatorAdapter for ShapeAdapter {
    fn name(&self) -> &str {
        "shape"
    }

    fn can_handle(&self, source: &SchemaSource) -> bool {
        matches!(source, SchemaSource::Shape(_))
    }

    fn validate(&self, raw: &Value, ctx: &ValidationContext<'_>) -> std::result::Result<Value, ValidationError> {
        match ctx.source {
            SchemaSource::Shape(shape) => shape.validate(raw),
            other => Err(unsupported(self.name(), other)),
        }
    }
}

/// Validates against a JSON-Schema document (converted to a [`Shape`]).
#[derive(Debug, Default)]
pub struct JsonSchemaAdapter;

impl ValidatorAdapter for JsonSchemaAdapter {
    fn name(&self) -> &str {
        "json-schema"
    }

    fn can_handle(&self, source: &SchemaSource) -> bool {
        matches!(source, SchemaSource::JsonSchema(Value::Object(_)))
    }

    fn validate(&self, raw: &Value, ctx: &ValidationContext<'_>) -> std::result::Result<Value, ValidationError> {
        match ctx.source {
            SchemaSource::JsonSchema(doc) => {
                let shape = Shape::from_json_schema(doc)
                    .map_err(|e| ValidationError::single("", &e.to_string(), "value_error"))?;
                shape.validate(raw)
            }
            other => Err(unsupported(self.name(), other)),
        }
    }
}

/// Validates by deserializing into `T` and serializing back.
///
/// Unknown fields are dropped unless `T` denies them.
pub struct TypedAdapter<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedAdapter<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedAdapter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ValidatorAdapter for TypedAdapter<T>
where
    T: DeserializeOwned + Serialize + 'static,
{
    fn name(&self) -> &str {
        type_name::<T>()
    }

    fn can_handle(&self, source: &SchemaSource) -> bool {
        matches!(source, SchemaSource::Rust { type_id, .. } if *type_id == TypeId::of::<T>())
    }

    fn validate(&self, raw: &Value, _ctx: &ValidationContext<'_>) -> std::result::Result<Value, ValidationError> {
        let typed: T = serde_json::from_value(raw.clone())
            .map_err(|e| ValidationError::single("", &e.to_string(), "value_error"))?;
        serde_json::to_value(typed)
            .map_err(|e| ValidationError::single("", &e.to_string(), "value_error"))
    }
}

fn unsupported(adapter: &str, source: &SchemaSource) -> ValidationError {
    ValidationError::single(
        "",
        &format!("adapter '{}' cannot validate {}", adapter, source),
        "value_error",
    )
}

// ---------------------------------------------------------------------------
// AdapterRegistry
// ---------------------------------------------------------------------------

struct Entry {
    priority: i32,
    adapter: Arc<dyn ValidatorAdapter>,
}

/// Ordered adapter table.
pub struct AdapterRegistry {
    entries: RwLock<Vec<Entry>>,
}

impl AdapterRegistry {
    /// Empty table; every lookup fails until adapters are added.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Table with the shape and JSON-Schema adapters.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(ShapeAdapter), SHAPE_PRIORITY);
        registry.register(Arc::new(JsonSchemaAdapter), JSON_SCHEMA_PRIORITY);
        registry
    }

    /// Add an adapter.  Among equal priorities the earlier one wins.
    pub fn register(&self, adapter: Arc<dyn ValidatorAdapter>, priority: i32) {
        let mut entries = self.entries.write();
        let pos = entries
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(entries.len());
        tracing::debug!(
            "Registered validator adapter '{}' (priority {})",
            adapter.name(),
            priority
        );
        entries.insert(pos, Entry { priority, adapter });
    }

    /// Add a [`TypedAdapter`] for `T`.
    pub fn register_type<T>(&self)
    where
        T: DeserializeOwned + Serialize + 'static,
    {
        self.register(Arc::new(TypedAdapter::<T>::new()), TYPED_PRIORITY);
    }

    /// First adapter that can handle `source`.
    pub fn select(&self, source: &SchemaSource) -> Option<Arc<dyn ValidatorAdapter>> {
        self.entries
            .read()
            .iter()
            .find(|e| e.adapter.can_handle(source))
            .map(|e| e.adapter.clone())
    }

    /// Like [`select`](Self::select) but a missing adapter is an error.
    pub fn require(&self, source: &SchemaSource) -> Result<Arc<dyn ValidatorAdapter>> {
        self.select(source)
            .ok_or_else(|| Error::NoAdapterFound(source.to_string()))
    }

    /// Select an adapter and validate in one step.
    pub fn validate(&self, raw: &Value, ctx: &ValidationContext<'_>) -> Result<Value> {
        let adapter = self.require(ctx.source)?;
        Ok(adapter.validate(raw, ctx)?)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
