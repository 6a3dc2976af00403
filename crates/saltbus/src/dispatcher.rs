// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound message dispatch.
//!
//! Per message: resolve matching handlers, filter them by version
//! compatibility, validate the payload against each handler's schema, then
//! either call the first eligible handler (request/response) or schedule
//! every eligible handler through the [`TaskExecutor`] (broadcast).
//!
//! The dispatcher only reads the handler index and the schema registry.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use saltbus_schema_registry::{
    Mode, RegistryError, SchemaRecord, SchemaRegistry, Shape, SubscribedVersion, LATEST,
};
use serde_json::Value;

use crate::adapter::{AdapterRegistry, SchemaSource, ValidationContext};
use crate::compat::{self, Eligibility};
use crate::config::DispatchConfig;
use crate::error::{Error, Result};
use crate::executor::{dedup_key, TaskExecutor, TaskRef};
use crate::handler::{HandlerContext, HandlerError, HandlerRegistry, Registration};
use crate::message::InboundMessage;
use crate::topic::validate_topic;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of a request/response dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchResult {
    /// Handler return value.
    Success(Value),
    /// Structured application error (`{error_code, error_message, details?}`).
    Error(Value),
    /// Nobody is subscribed; not an error.
    NoHandlers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Completed,
    NoHandlers,
}

/// What happened to one candidate handler.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerStatus {
    /// Broadcast handler handed to the executor.
    Scheduled { task: TaskRef },
    /// Not run: filtered out, or a later request/response candidate.
    Skipped { reason: String },
    /// Request/response handler returned a value or a structured error.
    Succeeded,
    /// Validation or scheduling failed for this handler.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandlerReport {
    pub handler: String,
    pub status: HandlerStatus,
}

/// A handler receiving messages newer than its subscribed schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleSubscriber {
    pub handler: String,
    pub subscribed_version: String,
    pub message_version: String,
}

/// Per-message summary.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRecord {
    pub topic: String,
    pub mode: Mode,
    pub correlation_id: String,
    pub status: DispatchStatus,
    pub handlers_executed: usize,
    pub handlers: Vec<HandlerReport>,
    pub stale_subscribers: Vec<StaleSubscriber>,
    pub elapsed: Duration,
}

impl CompletionRecord {
    /// Report for `handler`, if it was a candidate.
    pub fn report(&self, handler: &str) -> Option<&HandlerReport> {
        self.handlers.iter().find(|r| r.handler == handler)
    }
}

/// The completion record, plus the result for request/response messages.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub result: Option<DispatchResult>,
    pub record: CompletionRecord,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Borrowed view of the message being dispatched.
struct MessageInfo<'a> {
    topic: &'a str,
    version: Option<&'a str>,
    correlation_id: &'a str,
    mode: Mode,
}

/// A candidate that survived version filtering, with its validated payload.
struct Prepared {
    registration: Arc<Registration>,
    ctx: HandlerContext,
    payload: Value,
    schema: Option<SchemaRecord>,
}

pub struct Dispatcher {
    handlers: Arc<HandlerRegistry>,
    registry: Arc<SchemaRegistry>,
    adapters: Arc<AdapterRegistry>,
    executor: Arc<dyn TaskExecutor>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        handlers: Arc<HandlerRegistry>,
        registry: Arc<SchemaRegistry>,
        adapters: Arc<AdapterRegistry>,
        executor: Arc<dyn TaskExecutor>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            handlers,
            registry,
            adapters,
            executor,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Dispatch one inbound message.
    ///
    /// Request/response failures (validation, uncaught handler errors) are
    /// returned as `Err`. Broadcast failures are isolated per handler and
    /// reported in the completion record.
    pub fn dispatch(&self, message: InboundMessage) -> Result<DispatchOutcome> {
        let started = Instant::now();
        validate_topic(&message.topic).map_err(Error::InvalidTopic)?;

        let InboundMessage {
            topic,
            version,
            mode,
            correlation_id,
            payload,
        } = message;
        let raw = payload.into_value()?;

        let mut record = CompletionRecord {
            topic: topic.clone(),
            mode,
            correlation_id: correlation_id.clone(),
            status: DispatchStatus::Completed,
            handlers_executed: 0,
            handlers: Vec::new(),
            stale_subscribers: Vec::new(),
            elapsed: Duration::ZERO,
        };

        // RECEIVED -> HANDLERS_RESOLVED
        let mut eligible = Vec::new();
        for registration in self.handlers.matching(&topic) {
            if registration.mode != mode {
                record.handlers.push(skipped(
                    &registration.identity,
                    format!(
                        "handler mode {} does not match message mode {}",
                        registration.mode, mode
                    ),
                ));
                continue;
            }

            match compat::check(&registration.subscribed_version, version.as_deref()) {
                Eligibility::Eligible => eligible.push(registration),
                Eligibility::Stale {
                    subscribed,
                    message,
                } => {
                    tracing::warn!(
                        "Stale subscriber '{}' on {}: subscribed to {}, message is {}",
                        registration.identity,
                        topic,
                        subscribed,
                        message
                    );
                    record.stale_subscribers.push(StaleSubscriber {
                        handler: registration.identity.clone(),
                        subscribed_version: subscribed,
                        message_version: message,
                    });
                    eligible.push(registration);
                }
                Eligibility::Ineligible { reason } => {
                    tracing::debug!("Skipping '{}' on {}: {}", registration.identity, topic, reason);
                    record.handlers.push(skipped(&registration.identity, reason));
                }
            }
        }

        // HANDLERS_RESOLVED -> NO_HANDLERS
        if eligible.is_empty() {
            tracing::warn!(
                "No handlers for {} ({}, correlation {})",
                topic,
                mode,
                correlation_id
            );
            record.status = DispatchStatus::NoHandlers;
            record.elapsed = started.elapsed();
            let result = match mode {
                Mode::RequestResponse => Some(DispatchResult::NoHandlers),
                Mode::Broadcast => None,
            };
            return Ok(DispatchOutcome { result, record });
        }

        // HANDLERS_RESOLVED -> DISPATCHING
        let info = MessageInfo {
            topic: &topic,
            version: version.as_deref(),
            correlation_id: &correlation_id,
            mode,
        };

        let result = match mode {
            Mode::RequestResponse => {
                let first = eligible.remove(0);
                for later in eligible {
                    record.handlers.push(skipped(
                        &later.identity,
                        format!("'{}' answers request/response first", first.identity),
                    ));
                }

                let identity = first.identity.clone();
                let prepared = self.prepare(first, &raw, &info)?;
                let result = self.call(prepared)?;
                record.handlers_executed = 1;
                record.handlers.push(HandlerReport {
                    handler: identity,
                    status: HandlerStatus::Succeeded,
                });
                Some(result)
            }
            Mode::Broadcast => {
                for registration in eligible {
                    let identity = registration.identity.clone();
                    let status = match self.prepare(registration, &raw, &info) {
                        Ok(prepared) => self.schedule(prepared),
                        Err(err) => {
                            let error = describe(&err);
                            tracing::error!(
                                "Validation failed for handler '{}' on {} (correlation {}): {}",
                                identity,
                                topic,
                                correlation_id,
                                error
                            );
                            HandlerStatus::Failed { error }
                        }
                    };
                    if matches!(status, HandlerStatus::Scheduled { .. }) {
                        record.handlers_executed += 1;
                    }
                    record.handlers.push(HandlerReport {
                        handler: identity,
                        status,
                    });
                }
                None
            }
        };

        // DISPATCHING -> COMPLETED
        record.elapsed = started.elapsed();
        tracing::info!(
            "Dispatched {} ({}): {} handler(s) executed in {:?}",
            topic,
            mode,
            record.handlers_executed,
            record.elapsed
        );
        Ok(DispatchOutcome { result, record })
    }

    /// Resolve the handler's schema and validate the payload against it.
    fn prepare(
        &self,
        registration: Arc<Registration>,
        raw: &Value,
        info: &MessageInfo<'_>,
    ) -> Result<Prepared> {
        let (wanted, follow_latest) = match &registration.subscribed_version {
            SubscribedVersion::Exact(v) => (v.clone(), false),
            SubscribedVersion::Latest => (info.version.unwrap_or(LATEST).to_string(), true),
        };

        // A handler-supplied source wins over the registry schema. The
        // registry record still provides response and error shapes.
        let schema = match self.resolve_schema(info.topic, &wanted, follow_latest) {
            Ok(schema) => schema,
            Err(err) if registration.schema.is_some() => {
                tracing::debug!("No registry schema for '{}': {}", registration.identity, err);
                None
            }
            Err(err) => return Err(err),
        };

        let source = match (&registration.schema, &schema) {
            (Some(source), _) => Some(source.clone()),
            (None, Some(record)) => Some(SchemaSource::Shape(record.shape.clone())),
            (None, None) => None,
        };

        let ctx = HandlerContext {
            topic: info.topic.to_string(),
            message_version: info.version.map(str::to_string),
            schema_version: schema.as_ref().map(|r| r.version.clone()),
            correlation_id: info.correlation_id.to_string(),
            mode: info.mode,
            handler: registration.identity.clone(),
        };

        let payload = match &source {
            Some(source) => {
                let validation = ValidationContext {
                    source,
                    topic: info.topic,
                    version: ctx.schema_version.as_deref().unwrap_or(wanted.as_str()),
                    handler: Some(registration.identity.as_str()),
                };
                self.adapters.validate(raw, &validation)?
            }
            None => raw.clone(),
        };

        Ok(Prepared {
            registration,
            ctx,
            payload,
            schema,
        })
    }

    /// Registry lookup honouring `allow_unregistered_schemas`.
    ///
    /// With `follow_latest`, a message version the registry does not know
    /// is validated against the latest registered schema instead.
    fn resolve_schema(
        &self,
        topic: &str,
        version: &str,
        follow_latest: bool,
    ) -> Result<Option<SchemaRecord>> {
        let mut found = self.registry.get_or_local(topic, version);
        if follow_latest
            && version != LATEST
            && matches!(found, Err(RegistryError::SchemaNotFound { .. }))
        {
            tracing::debug!("No schema for {} {}; validating against latest", topic, version);
            found = self.registry.get_or_local(topic, LATEST);
        }

        match found {
            Ok(record) => Ok(Some(record)),
            Err(RegistryError::SchemaNotFound { .. }) if self.config.allow_unregistered_schemas => {
                tracing::debug!("No schema for {} {}; payload passes unvalidated", topic, version);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn schedule(&self, prepared: Prepared) -> HandlerStatus {
        let Prepared {
            registration,
            ctx,
            payload,
            ..
        } = prepared;
        let key = dedup_key(&ctx.correlation_id, &registration.identity);
        let handler = registration.handler.clone();
        let task = Box::new(move || handler.handle(&ctx, payload));

        match self.executor.schedule(&key, &registration.identity, task) {
            Ok(task) => HandlerStatus::Scheduled { task },
            Err(err) => {
                tracing::error!(
                    "Could not schedule handler '{}': {}",
                    registration.identity,
                    err
                );
                HandlerStatus::Failed {
                    error: err.to_string(),
                }
            }
        }
    }

    /// Invoke a request/response handler on the calling thread.
    fn call(&self, prepared: Prepared) -> Result<DispatchResult> {
        let Prepared {
            registration,
            ctx,
            payload,
            schema,
        } = prepared;
        let handler = registration.handler.clone();

        let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(&ctx, payload)));
        match outcome {
            Ok(Ok(value)) => {
                let shape = schema.as_ref().and_then(|s| s.response_shape.as_ref());
                Ok(DispatchResult::Success(check_shape(
                    shape, value, &ctx, "response",
                )))
            }
            Ok(Err(HandlerError::Rpc(err))) => {
                tracing::info!(
                    "Handler '{}' on {} returned error {}",
                    ctx.handler,
                    ctx.topic,
                    err.error_code
                );
                let shape = schema.as_ref().and_then(|s| s.error_shape.as_ref());
                Ok(DispatchResult::Error(check_shape(
                    shape,
                    err.to_response_value(),
                    &ctx,
                    "error",
                )))
            }
            Ok(Err(HandlerError::Internal(message))) => {
                tracing::error!("Handler '{}' on {} failed: {}", ctx.handler, ctx.topic, message);
                Err(Error::HandlerFailed {
                    handler: ctx.handler,
                    message,
                })
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    "Handler '{}' on {} panicked: {}",
                    ctx.handler,
                    ctx.topic,
                    message
                );
                Err(Error::HandlerFailed {
                    handler: ctx.handler,
                    message,
                })
            }
        }
    }
}

/// Validate a handler result against an optional shape. A value that does
/// not fit is returned unchanged, with a warning.
fn check_shape(shape: Option<&Shape>, value: Value, ctx: &HandlerContext, what: &str) -> Value {
    let Some(shape) = shape else {
        return value;
    };
    match shape.validate(&value) {
        Ok(validated) => validated,
        Err(err) => {
            tracing::warn!(
                "Handler '{}' on {} returned a {} that does not match its shape: {}",
                ctx.handler,
                ctx.topic,
                what,
                err.summary()
            );
            value
        }
    }
}

fn skipped(handler: &str, reason: String) -> HandlerReport {
    HandlerReport {
        handler: handler.to_string(),
        status: HandlerStatus::Skipped { reason },
    }
}

fn describe(err: &Error) -> String {
    match err {
        Error::ValidationFailed(v) => v.summary(),
        other => other.to_string(),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
