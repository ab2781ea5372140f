// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Echo Runtime - a complete custom runtime built on runtara-bridge.
//!
//! This example shows:
//! - Building a dependency context once at startup
//! - Echoing the event back as a JSON response
//! - Honouring the invocation's cancellation token for slow work
//! - Returning structured failures and binary bodies
//!
//! The event controls the behaviour:
//!
//! | Field | Effect |
//! |-------|--------|
//! | `delayMs` | Sleep before answering, stopping early if the invocation times out |
//! | `fail` | Report an `EchoError` with the given message |
//! | `binary` | Answer with the UTF-8 bytes of the string as `application/octet-stream` |
//!
//! Run with: AWS_LAMBDA_RUNTIME_API=127.0.0.1:9001 cargo run -p bridge-example --bin echo_runtime

use std::sync::Arc;
use std::time::{Duration, Instant};

use runtara_bridge::{
    BridgeConfig, Failure, HandlerResponse, HandlerResult, InvocationContext, handler_fn,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

/// Shared, read-only state built once per execution environment.
struct EchoDeps {
    handler_name: String,
    started: Instant,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EchoOptions {
    delay_ms: Option<u64>,
    fail: Option<String>,
    binary: Option<String>,
}

async fn echo(event: Value, ctx: InvocationContext, deps: Option<Arc<EchoDeps>>) -> HandlerResult {
    let options: EchoOptions = serde_json::from_value(event.clone()).unwrap_or_default();

    if let Some(delay_ms) = options.delay_ms {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            _ = ctx.cancellation.cancelled() => {
                warn!(request_id = %ctx.request_id, "Invocation abandoned, stopping work");
                return Ok(None);
            }
        }
    }

    if let Some(message) = options.fail {
        return Err(Failure::new("EchoError", message));
    }

    if let Some(text) = options.binary {
        return Ok(Some(
            HandlerResponse::new(200)
                .with_header("content-type", "application/octet-stream")
                .with_body(text.into_bytes()),
        ));
    }

    let (handler_name, uptime_ms) = deps
        .map(|d| (d.handler_name.clone(), d.started.elapsed().as_millis() as u64))
        .unwrap_or_default();

    Ok(Some(HandlerResponse::json(json!({
        "requestId": ctx.request_id,
        "traceId": ctx.trace_id,
        "handler": handler_name,
        "uptimeMs": uptime_ms,
        "echo": event,
    }))))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("=== Echo Runtime ===");

    let handler = handler_fn(|event: Value, ctx: InvocationContext, deps: Option<Arc<EchoDeps>>| {
        echo(event, ctx, deps)
    });

    runtara_bridge::run_with_deps(handler, |config: &BridgeConfig| {
        let handler_name = config.handler.clone().unwrap_or_else(|| "echo".to_string());
        async move {
            info!(handler = %handler_name, "Building dependency context");
            Ok(EchoDeps {
                handler_name,
                started: Instant::now(),
            })
        }
    })
    .await?;

    Ok(())
}
