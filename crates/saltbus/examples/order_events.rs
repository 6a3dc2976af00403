// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Order events demo.
//!
//! Publishes through an in-process queue standing in for the transport,
//! then dispatches each queued envelope.
//!
//! ```bash
//! cargo run --example order_events            # info
//! cargo run --example order_events -- debug
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use saltbus::{
    Bootstrap, DispatchResult, FieldType, HandlerContext, HandlerError, HandlerSpec, Mode,
    NewSchema, RpcError, Saltbus, SaltbusConfig, Shape,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

type Queue = Arc<Mutex<VecDeque<(String, Vec<u8>)>>>;

fn on_order_created(ctx: &HandlerContext, order: Value) -> Result<Value, HandlerError> {
    println!(
        "  [billing] order {} total {} (schema {})",
        order["order_id"],
        order["total"],
        ctx.schema_version.as_deref().unwrap_or("-")
    );
    Ok(Value::Null)
}

fn on_any_order_event(ctx: &HandlerContext, _event: Value) -> Result<Value, HandlerError> {
    println!("  [audit] {} ({})", ctx.topic, ctx.correlation_id);
    Ok(Value::Null)
}

fn get_stock(_ctx: &HandlerContext, request: Value) -> Result<Value, HandlerError> {
    match request["sku"].as_str() {
        Some("A-100") => Ok(json!({"sku": "A-100", "available": 12})),
        Some(sku) => Err(RpcError::new("UNKNOWN_SKU", format!("no stock record for {}", sku)).into()),
        None => Err(HandlerError::internal("sku missing after validation")),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let level = std::env::args().nth(1).unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let queue: Queue = Arc::default();
    let outbox = queue.clone();
    let transport = move |topic: &str, _mode: Mode, body: Vec<u8>| -> saltbus::Result<()> {
        outbox.lock().push_back((topic.to_string(), body));
        Ok(())
    };

    let bus = Saltbus::new(SaltbusConfig::default())?.with_transport(Arc::new(transport));

    let order = Shape::new()
        .field("order_id", FieldType::Integer)
        .field("total", FieldType::Number);

    let report = Bootstrap::new()
        .schema(NewSchema::new("orders.created", "v1", order.clone()).publisher("checkout"))
        .schema(
            NewSchema::new(
                "orders.created",
                "v2",
                order.optional("currency", FieldType::String),
            )
            .publisher("checkout"),
        )
        .schema(
            NewSchema::new("rpc.inventory.stock", "v1", Shape::new().field("sku", FieldType::String))
                .mode(Mode::RequestResponse)
                .response_shape(
                    Shape::new()
                        .field("sku", FieldType::String)
                        .field("available", FieldType::Integer),
                )
                .publisher("inventory"),
        )
        .handler(HandlerSpec::new("orders.created", "billing", on_order_created).version("v1"))
        .handler(HandlerSpec::new("orders.#", "audit", on_any_order_event))
        .handler(
            HandlerSpec::new("rpc.inventory.stock", "inventory", get_stock)
                .mode(Mode::RequestResponse),
        )
        .init(&bus)?;

    println!("Saltbus demo v{}", env!("CARGO_PKG_VERSION"));
    println!("=====================================");
    println!(
        "{} schema(s), {} handler(s)",
        report.schemas_created, report.handlers_registered
    );
    println!();

    let checkout = bus.publisher("checkout");
    checkout.publish(
        "orders.created",
        "v1",
        Mode::Broadcast,
        json!({"order_id": 1, "total": 9.99}),
    )?;
    checkout.publish(
        "orders.created",
        "v2",
        Mode::Broadcast,
        json!({"order_id": 2, "total": 20.0, "currency": "EUR"}),
    )?;

    let storefront = bus.publisher("storefront");
    for sku in ["A-100", "Z-999"] {
        storefront.publish("rpc.inventory.stock", "v1", Mode::RequestResponse, json!({ "sku": sku }))?;
    }

    loop {
        let Some((topic, body)) = queue.lock().pop_front() else {
            break;
        };
        println!("-> {}", topic);
        let outcome = bus.dispatch_bytes(&topic, &body)?;
        match outcome.result {
            Some(DispatchResult::Success(value)) => println!("  <- {}", value),
            Some(DispatchResult::Error(error)) => println!("  <- error {}", error),
            Some(DispatchResult::NoHandlers) => println!("  <- no handlers"),
            None => {}
        }
        for stale in &outcome.record.stale_subscribers {
            println!(
                "  stale: {} on {} (message {})",
                stale.handler, stale.subscribed_version, stale.message_version
            );
        }
    }

    Ok(())
}
