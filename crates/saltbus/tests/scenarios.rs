// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end dispatch scenarios.

use std::sync::Arc;

use parking_lot::Mutex;
use saltbus::{
    compat, DispatchResult, DispatchStatus, Error, FieldType, HandlerContext, HandlerError,
    HandlerSpec, HandlerStatus, InboundMessage, InlineExecutor, Mode, NewSchema, RegistryError,
    RpcError, Saltbus, SaltbusConfig, SchemaRegistry, Shape, SubscribedVersion, TopicPattern,
};
use serde_json::{json, Value};

type Seen = Arc<Mutex<Vec<(String, Value)>>>;

fn bus() -> (Saltbus, Arc<InlineExecutor>) {
    let executor = Arc::new(InlineExecutor::new());
    let bus = Saltbus::with_parts(
        SaltbusConfig::default(),
        Arc::new(SchemaRegistry::in_memory()),
        executor.clone(),
    );
    (bus, executor)
}

fn order_shape() -> Shape {
    Shape::new()
        .field("order_id", FieldType::Integer)
        .field("total", FieldType::Number)
}

fn recorder(
    seen: &Seen,
) -> impl Fn(&HandlerContext, Value) -> Result<Value, HandlerError> + Send + Sync + 'static {
    let seen = seen.clone();
    move |ctx: &HandlerContext, payload: Value| -> Result<Value, HandlerError> {
        seen.lock().push((ctx.handler.clone(), payload));
        Ok(Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[test]
fn registration_is_idempotent_and_conflicts_are_reported() {
    let (bus, _) = bus();
    let first = bus
        .register_schema(NewSchema::new("orders.created", "v1", order_shape()))
        .unwrap();
    assert!(first.created);

    let again = bus
        .register_schema(NewSchema::new("orders.created", "v1", order_shape()))
        .unwrap();
    assert!(!again.created);
    assert_eq!(again.existing_shape, Some(order_shape()));

    let err = bus
        .register_schema(NewSchema::new(
            "orders.created",
            "v1",
            order_shape().field("currency", FieldType::String),
        ))
        .unwrap_err();
    match err {
        Error::Registry(RegistryError::SchemaConflict {
            existing, proposed, ..
        }) => {
            assert_eq!(*existing, order_shape());
            assert!(proposed.get("currency").is_some());
        }
        other => panic!("expected SchemaConflict, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Topic patterns
// ---------------------------------------------------------------------------

#[test]
fn rest_wildcard_matches_any_depth_under_prefix() {
    let pattern = TopicPattern::parse("orders.#").unwrap();
    for topic in ["orders", "orders.created", "orders.created.eu", "orders.a.b.c.d"] {
        assert!(pattern.matches(topic), "{} should match", topic);
    }
    for topic in ["order", "users.orders", "ordersx.created"] {
        assert!(!pattern.matches(topic), "{} should not match", topic);
    }
}

#[test]
fn single_wildcard_matches_exactly_one_segment() {
    let pattern = TopicPattern::parse("orders.*.eu").unwrap();
    assert!(pattern.matches("orders.created.eu"));
    assert!(pattern.matches("orders.shipped.eu"));
    assert!(!pattern.matches("orders.eu"));
    assert!(!pattern.matches("orders.created.us"));
    assert!(!pattern.matches("orders.created.extra.eu"));
}

// ---------------------------------------------------------------------------
// Version compatibility
// ---------------------------------------------------------------------------

#[test]
fn version_compatibility_table() {
    let v1 = SubscribedVersion::from("v1");
    let v2 = SubscribedVersion::from("v2");

    assert!(matches!(
        compat::check(&v1, Some("v2")),
        compat::Eligibility::Stale { .. }
    ));
    assert!(!compat::check(&v2, Some("v1")).is_eligible());
    for message in [Some("v1"), Some("v99"), Some("beta"), None] {
        assert_eq!(
            compat::check(&SubscribedVersion::Latest, message),
            compat::Eligibility::Eligible
        );
    }
}

// ---------------------------------------------------------------------------
// Dedup
// ---------------------------------------------------------------------------

#[test]
fn redelivered_broadcast_runs_each_handler_once() {
    let (bus, executor) = bus();
    bus.register_schema(NewSchema::new("orders.created", "v1", order_shape()))
        .unwrap();

    let seen: Seen = Arc::default();
    bus.register_handler(HandlerSpec::new("orders.created", "billing", recorder(&seen)))
        .unwrap();
    bus.register_handler(HandlerSpec::new("orders.#", "audit", recorder(&seen)))
        .unwrap();

    let message = InboundMessage::broadcast("orders.created", json!({"order_id": 1, "total": 9.99}))
        .version("v1")
        .correlation_id("redelivered");
    for _ in 0..3 {
        let outcome = bus.dispatch(message.clone()).unwrap();
        assert_eq!(outcome.record.handlers_executed, 2);
    }

    assert_eq!(seen.lock().len(), 2);
    assert_eq!(executor.executed(), 2);
    assert!(executor.is_scheduled("redelivered:billing"));
    assert!(executor.is_scheduled("redelivered:audit"));
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_exact_subscription_to_current_version() {
    let (bus, _) = bus();
    bus.register_schema(NewSchema::new("orders.created", "v1", order_shape()))
        .unwrap();

    let seen: Seen = Arc::default();
    bus.register_handler(
        HandlerSpec::new("orders.created", "billing", recorder(&seen)).version("v1"),
    )
    .unwrap();

    let outcome = bus
        .dispatch(
            InboundMessage::broadcast("orders.created", json!({"order_id": 1, "total": 9.99}))
                .version("v1"),
        )
        .unwrap();

    assert_eq!(outcome.record.status, DispatchStatus::Completed);
    assert_eq!(outcome.record.handlers_executed, 1);
    assert!(outcome.record.stale_subscribers.is_empty());
    assert_eq!(
        seen.lock().as_slice(),
        &[("billing".to_string(), json!({"order_id": 1, "total": 9.99}))]
    );
}

#[test]
fn scenario_stale_subscriber_gets_trimmed_payload() {
    let (bus, _) = bus();
    bus.register_schema(NewSchema::new("orders.created", "v1", order_shape()))
        .unwrap();

    let seen: Seen = Arc::default();
    bus.register_handler(
        HandlerSpec::new("orders.created", "billing", recorder(&seen)).version("v1"),
    )
    .unwrap();

    let outcome = bus
        .dispatch(
            InboundMessage::broadcast(
                "orders.created",
                json!({"order_id": 1, "total": 9.99, "currency": "USD"}),
            )
            .version("v2"),
        )
        .unwrap();

    assert_eq!(outcome.record.handlers_executed, 1);
    assert_eq!(outcome.record.stale_subscribers.len(), 1);
    let stale = &outcome.record.stale_subscribers[0];
    assert_eq!(stale.handler, "billing");
    assert_eq!(stale.subscribed_version, "v1");
    assert_eq!(stale.message_version, "v2");

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].1.get("currency").is_none());
}

#[test]
fn scenario_single_and_rest_wildcards() {
    let (bus, _) = bus();
    bus.register_schema(NewSchema::new("orders.created.eu", "v1", order_shape()))
        .unwrap();

    let seen: Seen = Arc::default();
    bus.register_handler(HandlerSpec::new("orders.*", "one-level", recorder(&seen)))
        .unwrap();
    bus.register_handler(HandlerSpec::new("orders.#", "any-depth", recorder(&seen)))
        .unwrap();

    let outcome = bus
        .dispatch(
            InboundMessage::broadcast("orders.created.eu", json!({"order_id": 5, "total": 1.0}))
                .version("v1"),
        )
        .unwrap();

    assert_eq!(outcome.record.handlers_executed, 1);
    assert!(outcome.record.report("one-level").is_none());
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "any-depth");
}

#[test]
fn scenario_request_without_handlers() {
    let (bus, _) = bus();
    let outcome = bus
        .dispatch(InboundMessage::request("rpc.inventory.check", json!({"sku": "A1"})))
        .unwrap();
    assert_eq!(outcome.result, Some(DispatchResult::NoHandlers));
    assert_eq!(outcome.record.status, DispatchStatus::NoHandlers);
}

#[test]
fn scenario_structured_error_is_returned_validated() {
    let (bus, _) = bus();
    bus.register_schema(
        NewSchema::new(
            "rpc.payments.charge",
            "v1",
            Shape::new()
                .field("order_id", FieldType::Integer)
                .field("amount", FieldType::Number),
        )
        .mode(Mode::RequestResponse)
        .response_shape(Shape::new().field("charge_id", FieldType::String))
        .error_shape(
            Shape::new()
                .field("error_code", FieldType::String)
                .field("error_message", FieldType::String)
                .optional("details", FieldType::Any),
        ),
    )
    .unwrap();

    bus.register_handler(
        HandlerSpec::new(
            "rpc.payments.charge",
            "payments",
            |_ctx: &HandlerContext, payload: Value| -> Result<Value, HandlerError> {
                Err(RpcError::new("CARD_DECLINED", "card was declined")
                    .with_details(json!({"order_id": payload["order_id"]}))
                    .into())
            },
        )
        .mode(Mode::RequestResponse)
        .version("v1"),
    )
    .unwrap();

    let outcome = bus
        .dispatch(
            InboundMessage::request("rpc.payments.charge", json!({"order_id": 12, "amount": 30.0}))
                .version("v1"),
        )
        .unwrap();

    assert_eq!(
        outcome.result,
        Some(DispatchResult::Error(json!({
            "error_code": "CARD_DECLINED",
            "error_message": "card was declined",
            "details": {"order_id": 12}
        })))
    );
    assert_eq!(
        outcome.record.report("payments").unwrap().status,
        HandlerStatus::Succeeded
    );
}
