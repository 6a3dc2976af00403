// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handler registration and topic matching.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use saltbus_schema_registry::{Mode, SubscribedVersion};
use serde_json::Value;

use crate::adapter::SchemaSource;
use crate::error::{Error, Result};
use crate::rpc::RpcError;
use crate::topic::TopicPattern;

// ---------------------------------------------------------------------------
// Handler trait
// ---------------------------------------------------------------------------

/// What a handler sees about the message it is processing.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// Concrete topic of the message.
    pub topic: String,
    /// Version the publisher tagged the message with.
    pub message_version: Option<String>,
    /// Version the payload was validated against.
    pub schema_version: Option<String>,
    pub correlation_id: String,
    pub mode: Mode,
    pub handler: String,
}

/// Handler failures.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerError {
    /// Intentional, structured application error (request/response only).
    Rpc(RpcError),
    /// Anything else.
    Internal(String),
}

impl HandlerError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(e) => write!(f, "{}", e),
            Self::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for HandlerError {}

impl From<RpcError> for HandlerError {
    fn from(e: RpcError) -> Self {
        Self::Rpc(e)
    }
}

/// Message handler.
///
/// Receives the validated payload; returns the response payload
/// (ignored for broadcast topics).
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, ctx: &HandlerContext, payload: Value) -> std::result::Result<Value, HandlerError>;
}

/// A function-based handler.
impl<F> Handler for F
where
    F: Fn(&HandlerContext, Value) -> std::result::Result<Value, HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, ctx: &HandlerContext, payload: Value) -> std::result::Result<Value, HandlerError> {
        self(ctx, payload)
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Registration request.
pub struct HandlerSpec {
    pub pattern: String,
    pub identity: String,
    /// `None` means the dispatcher's configured default.
    pub subscribed_version: Option<SubscribedVersion>,
    pub mode: Mode,
    /// Validate with this source instead of the registry schema.
    pub schema: Option<SchemaSource>,
    pub handler: Arc<dyn Handler>,
}

impl HandlerSpec {
    /// Broadcast handler on `pattern`.
    pub fn new(pattern: impl Into<String>, identity: impl Into<String>, handler: impl Handler) -> Self {
        Self {
            pattern: pattern.into(),
            identity: identity.into(),
            subscribed_version: None,
            mode: Mode::Broadcast,
            schema: None,
            handler: Arc::new(handler),
        }
    }

    pub fn version(mut self, version: impl Into<SubscribedVersion>) -> Self {
        self.subscribed_version = Some(version.into());
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn schema(mut self, schema: SchemaSource) -> Self {
        self.schema = Some(schema);
        self
    }
}

impl fmt::Debug for HandlerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSpec")
            .field("pattern", &self.pattern)
            .field("identity", &self.identity)
            .field("subscribed_version", &self.subscribed_version)
            .field("mode", &self.mode)
            .finish()
    }
}

/// A stored registration.  Immutable once registered.
pub struct Registration {
    pub pattern: TopicPattern,
    pub identity: String,
    pub subscribed_version: SubscribedVersion,
    pub mode: Mode,
    pub schema: Option<SchemaSource>,
    pub handler: Arc<dyn Handler>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("pattern", &self.pattern.as_str())
            .field("identity", &self.identity)
            .field("subscribed_version", &self.subscribed_version)
            .field("mode", &self.mode)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Index {
    exact: HashMap<String, Vec<Arc<Registration>>>,
    patterns: Vec<Arc<Registration>>,
}

impl Index {
    fn iter(&self) -> impl Iterator<Item = &Arc<Registration>> {
        self.exact.values().flatten().chain(self.patterns.iter())
    }
}

/// Index of handlers by exact topic and by wildcard pattern.
///
/// Both buckets sit behind one lock so a reader never observes a
/// half-applied registration.
pub struct HandlerRegistry {
    index: RwLock<Index>,
    default_version: SubscribedVersion,
    reject_duplicate_request_handlers: bool,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            index: RwLock::new(Index::default()),
            default_version: SubscribedVersion::Latest,
            reject_duplicate_request_handlers: false,
        }
    }

    /// Version given to registrations that do not name one.
    pub fn with_default_version(mut self, version: SubscribedVersion) -> Self {
        self.default_version = version;
        self
    }

    /// Refuse a second request/response handler on the same pattern.
    pub fn reject_duplicate_request_handlers(mut self, reject: bool) -> Self {
        self.reject_duplicate_request_handlers = reject;
        self
    }

    /// Register a handler.
    pub fn register(&self, spec: HandlerSpec) -> Result<Arc<Registration>> {
        let pattern = TopicPattern::parse(&spec.pattern).map_err(Error::InvalidPattern)?;
        let registration = Arc::new(Registration {
            pattern,
            identity: spec.identity,
            subscribed_version: spec.subscribed_version.unwrap_or_else(|| self.default_version.clone()),
            mode: spec.mode,
            schema: spec.schema,
            handler: spec.handler,
        });

        let mut index = self.index.write();
        for existing in index.iter() {
            if existing.pattern == registration.pattern {
                if existing.identity == registration.identity {
                    return Err(Error::DuplicateHandler {
                        pattern: registration.pattern.to_string(),
                        handler: registration.identity.clone(),
                    });
                }
                if self.reject_duplicate_request_handlers
                    && existing.mode == Mode::RequestResponse
                    && registration.mode == Mode::RequestResponse
                {
                    return Err(Error::DuplicateRequestHandler {
                        pattern: registration.pattern.to_string(),
                        existing: existing.identity.clone(),
                    });
                }
            }
        }

        if registration.pattern.is_exact() {
            index
                .exact
                .entry(registration.pattern.to_string())
                .or_default()
                .push(registration.clone());
        } else {
            index.patterns.push(registration.clone());
        }
        drop(index);

        tracing::debug!(
            "Registered handler '{}' on '{}' ({}, version {})",
            registration.identity,
            registration.pattern,
            registration.mode,
            registration.subscribed_version
        );
        Ok(registration)
    }

    /// Registrations matching a concrete topic: exact ones first, then
    /// wildcard ones, each in registration order.
    pub fn matching(&self, topic: &str) -> Vec<Arc<Registration>> {
        let index = self.index.read();
        let mut out: Vec<Arc<Registration>> = index.exact.get(topic).cloned().unwrap_or_default();
        out.extend(
            index
                .patterns
                .iter()
                .filter(|r| r.pattern.matches(topic))
                .cloned(),
        );
        out
    }

    /// Distinct registered patterns, sorted, minus those matched by any of
    /// `exclude` (for binding the transport).
    pub fn routing_keys(&self, exclude: &[&str]) -> Vec<String> {
        let excluded: Vec<TopicPattern> = exclude
            .iter()
            .filter_map(|p| match TopicPattern::parse(p) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    tracing::warn!("Ignoring invalid exclusion pattern: {}", err);
                    None
                }
            })
            .collect();

        let keys: BTreeSet<String> = self
            .index
            .read()
            .iter()
            .map(|r| r.pattern.to_string())
            .filter(|key| !excluded.iter().any(|ex| ex.as_str() == key || ex.matches(key)))
            .collect();
        keys.into_iter().collect()
    }

    /// Number of registrations, or of those matching `topic`.
    pub fn handler_count(&self, topic: Option<&str>) -> usize {
        match topic {
            Some(topic) => self.matching(topic).len(),
            None => self.index.read().iter().count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.handler_count(None) == 0
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
