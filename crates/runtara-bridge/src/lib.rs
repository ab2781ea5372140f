// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtara Bridge - custom runtime bootstrap for the Lambda Runtime API.
//!
//! This crate turns any [`Handler`] into a function runtime: it long-polls the
//! platform's control plane for the next invocation, runs the handler under
//! the invocation's deadline and reports exactly one outcome (a response, a
//! timeout or a failure) before polling again. It also provides the
//! extensions API loop used by sidecar extensions.
//!
//! # Features
//!
//! - **Invocation loop**: strictly sequential poll/dispatch/report cycles
//! - **Deadlines**: the handler races the remaining budget; on timeout its
//!   cancellation token fires and the loop moves on
//! - **Failure isolation**: handler errors and panics are reported, never fatal
//! - **Response envelopes**: text vs. base64 bodies decided by content type
//! - **Extensions**: register for `INVOKE`/`SHUTDOWN` and consume events
//!
//! # Quick Start
//!
//! ```ignore
//! use runtara_bridge::{HandlerResponse, InvocationContext, handler_fn};
//! use serde_json::Value;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handler = handler_fn(|event: Value, ctx: InvocationContext, _deps: Option<Arc<()>>| async move {
//!         Ok(Some(HandlerResponse::json(serde_json::json!({
//!             "requestId": ctx.request_id,
//!             "echo": event,
//!         }))))
//!     });
//!
//!     runtara_bridge::run(handler).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `AWS_LAMBDA_RUNTIME_API` | Yes | - | Control plane `host:port` |
//! | `LAMBDA_TASK_ROOT` | No | - | Task root directory |
//! | `_HANDLER` | No | - | Handler identifier |
//! | `RUNTARA_BRIDGE_DEFAULT_TIMEOUT_MS` | No | `60000` | Budget when no deadline is sent |
//! | `RUNTARA_BRIDGE_REPORT_RETRIES` | No | `0` | Retries for report POSTs |
//! | `RUNTARA_BRIDGE_REPORT_RETRY_DELAY_MS` | No | `100` | Delay between report retries |
//! | `RUNTARA_BRIDGE_EXTENSION_NAME` | No | `runtara-bridge-extension` | Extension name |

mod client;
mod config;
mod error;
mod failure;
mod handler;
mod reporter;
mod response;
mod server;
mod types;

pub mod extension;

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info};

pub use client::RuntimeApiClient;
pub use config::{BridgeConfig, ConfigError, DEFAULT_EXTENSION_NAME, DEFAULT_TIMEOUT_MS};
pub use error::{BridgeError, Result};
pub use failure::Failure;
pub use handler::{Handler, HandlerFn, HandlerResult, InvocationContext, handler_fn};
pub use reporter::{
    ERROR_TYPE_PREFIX, ErrorEnvelope, GENERIC_ERROR_TYPE, ReportKind, UNKNOWN_ERROR_MESSAGE,
    classify,
};
pub use response::{
    Body, HandlerResponse, InvocationOutcome, ResponseEnvelope, format_response,
    is_binary_content_type,
};
pub use server::{CycleReport, InvocationServer, TIMEOUT_MESSAGE, compute_budget};
pub use types::{
    DEADLINE_MS_HEADER, ERROR_CONTENT_TYPE, ERROR_TYPE_HEADER, FUNCTION_ARN_HEADER,
    InvocationRequest, REQUEST_ID_HEADER, TRACE_ID_HEADER,
};

/// Serve invocations with a handler that needs no dependency context.
///
/// Configuration is read from the environment. Returns only when the control
/// plane fails.
pub async fn run<H: Handler>(handler: H) -> Result<()> {
    let config = load_config()?;
    let server = InvocationServer::from_config(&config, handler, None)?;
    server.run().await
}

/// Build the dependency context once, then serve invocations.
///
/// A factory failure is reported to `init/error` as `RuntimeBridge.InitError`
/// and returned as [`BridgeError::Init`].
pub async fn run_with_deps<H, F, Fut>(handler: H, build_deps: F) -> Result<()>
where
    H: Handler,
    F: FnOnce(&BridgeConfig) -> Fut,
    Fut: Future<Output = std::result::Result<H::Deps, Failure>>,
{
    let config = load_config()?;
    let client = RuntimeApiClient::new(&config)?;

    let deps = match build_deps(&config).await {
        Ok(deps) => deps,
        Err(failure) => {
            error!(error = %failure, "Failed to build dependency context");
            if let Err(e) = client.post_init_error(ReportKind::InitError, &failure).await {
                error!(error = %e, "Could not report init error to control plane");
            }
            return Err(BridgeError::Init(failure.to_string()));
        }
    };
    info!("Dependency context ready");

    InvocationServer::new(client, handler, Some(Arc::new(deps)))
        .with_default_timeout_ms(config.default_timeout_ms)
        .run()
        .await
}

fn load_config() -> Result<BridgeConfig> {
    BridgeConfig::from_env().map_err(|e| {
        error!(error = %e, "Runtime configuration is incomplete");
        BridgeError::from(e)
    })
}
