// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The handler seam: what the invocation loop calls for every request.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::failure::Failure;
use crate::response::HandlerResponse;

/// Per-invocation metadata handed to the handler.
///
/// The trace id lives here rather than in process-wide state; it is valid for
/// this invocation only.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    /// Platform-assigned request id
    pub request_id: String,
    /// Trace propagation token. Not exported as `_X_AMZN_TRACE_ID`; forward
    /// it yourself to clients that read the trace from the environment.
    pub trace_id: String,
    /// ARN of the invoked function
    pub function_arn: String,
    /// Absolute deadline, if the platform supplied one
    pub deadline: Option<DateTime<Utc>>,
    /// Cancelled when the invocation times out. The bridge stops waiting at
    /// that point; a handler that ignores the token keeps running detached.
    pub cancellation: CancellationToken,
}

impl InvocationContext {
    /// Whether the invocation has been abandoned.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Result type returned by handlers. `Ok(None)` reports an empty `200`.
pub type HandlerResult = std::result::Result<Option<HandlerResponse>, Failure>;

/// A function handler.
///
/// `Deps` is the dependency context built once at startup and shared
/// read-only by every invocation; use `()` when there is none.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Dependency context type.
    type Deps: Send + Sync + 'static;

    /// Handle one event.
    async fn invoke(
        &self,
        event: Value,
        context: InvocationContext,
        deps: Option<Arc<Self::Deps>>,
    ) -> HandlerResult;
}

/// Handler built from an async closure. See [`handler_fn`].
pub struct HandlerFn<F, D = ()> {
    f: F,
    _deps: PhantomData<fn() -> D>,
}

/// Wrap an async closure `(event, context, deps) -> HandlerResult` as a
/// [`Handler`].
///
/// ```ignore
/// let handler = handler_fn(|event: Value, _ctx, _deps: Option<Arc<()>>| async move {
///     Ok(Some(HandlerResponse::json(event)))
/// });
/// ```
pub fn handler_fn<F, Fut, D>(f: F) -> HandlerFn<F, D>
where
    F: Fn(Value, InvocationContext, Option<Arc<D>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
    D: Send + Sync + 'static,
{
    HandlerFn {
        f,
        _deps: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, D> Handler for HandlerFn<F, D>
where
    F: Fn(Value, InvocationContext, Option<Arc<D>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
    D: Send + Sync + 'static,
{
    type Deps = D;

    async fn invoke(
        &self,
        event: Value,
        context: InvocationContext,
        deps: Option<Arc<D>>,
    ) -> HandlerResult {
        (self.f)(event, context, deps).await
    }
}
