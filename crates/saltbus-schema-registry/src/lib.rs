// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema Registry for saltbus topics.
//!
//! Stores versioned structural schemas per topic, detects redefinition
//! conflicts, and keeps working (by deferring writes) when the shared
//! backing store is unreachable.
//!
//! # Features
//!
//! - **Schema storage**: register and retrieve shapes by `(topic, version)`,
//!   with `"latest"` resolving to the highest active numeric version
//! - **Structural validation**: [`Shape`] walks a payload and collects every
//!   field error
//! - **Compatibility diffing**: classify an evolution as FULL, BACKWARD,
//!   FORWARD or BREAKING
//! - **Pluggable storage**: memory, JSON files, or SQLite (feature `sqlite`)
//!
//! # Architecture
//!
//! ```text
//! Publishers / Dispatcher
//!        |
//!        v
//!   SchemaRegistry (local cache + pending queue)
//!        |
//!        v
//!   SchemaStore (memory | file | sqlite)
//! ```

pub mod compatibility;
pub mod config;
pub mod error;
pub mod memory;
pub mod persistence;
pub mod record;
pub mod registry;
pub mod shape;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;
pub mod version;

pub use compatibility::{check_compatibility, Compatibility, CompatibilityResult};
pub use config::{Backend, RegistryConfig};
pub use error::RegistryError;
pub use memory::MemoryStore;
pub use persistence::FileStore;
pub use record::{Mode, NewSchema, SchemaRecord};
pub use registry::{FlushReport, RegisterOutcome, SchemaRegistry};
pub use shape::{Field, FieldError, FieldType, Shape, ShapeError, StringFormat, ValidationError};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use store::{InsertOutcome, SchemaStore, StoreError};
pub use version::{SubscribedVersion, LATEST};
