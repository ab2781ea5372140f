// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The invocation loop.
//!
//! One cycle: poll for an invocation, adopt its identity, race the handler
//! against the remaining budget, classify the outcome, report it exactly once,
//! clear the per-request state. The loop only ends on a control plane failure.
//!
//! ```text
//! Idle -> Polling -> Dispatching -> Racing -> Completed -> Reporting -> Idle
//! ```
//!
//! Timeouts are soft: the handler's [`CancellationToken`] is cancelled and its
//! task is detached, but a handler that never observes the token may keep
//! running (and producing side effects) after the timeout was reported.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use crate::client::RuntimeApiClient;
use crate::config::{BridgeConfig, DEFAULT_TIMEOUT_MS};
use crate::error::{BridgeError, Result};
use crate::failure::Failure;
use crate::handler::Handler;
use crate::reporter::ReportKind;
use crate::response::{InvocationOutcome, ResponseEnvelope, format_response};
use crate::types::InvocationRequest;

/// Message reported when the budget runs out.
pub const TIMEOUT_MESSAGE: &str = "Function timed out";

/// What a cycle reported to the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    /// A response envelope was posted
    Response {
        /// Request the report belongs to
        request_id: String,
        /// Reported status code
        status_code: u16,
    },
    /// An empty `200` was posted
    NoContent {
        /// Request the report belongs to
        request_id: String,
    },
    /// A `TimeoutError` was posted
    TimedOut {
        /// Request the report belongs to
        request_id: String,
    },
    /// A `RequestError` was posted
    Failed {
        /// Request the report belongs to
        request_id: String,
    },
}

impl CycleReport {
    /// Request the report belongs to.
    pub fn request_id(&self) -> &str {
        match self {
            CycleReport::Response { request_id, .. }
            | CycleReport::NoContent { request_id }
            | CycleReport::TimedOut { request_id }
            | CycleReport::Failed { request_id } => request_id,
        }
    }
}

/// Identity of the invocation currently being served.
#[derive(Debug, Default)]
struct RequestState {
    request_id: Option<String>,
    trace_id: Option<String>,
}

impl RequestState {
    fn adopt(&mut self, request: &InvocationRequest) {
        self.request_id = Some(request.request_id.clone());
        self.trace_id = Some(request.trace_id.clone());
    }

    fn clear(&mut self) {
        self.request_id = None;
        self.trace_id = None;
    }
}

/// Time left for an invocation, never less than one millisecond.
///
/// Without a deadline the budget is `default_timeout_ms`.
pub fn compute_budget(deadline_ms: Option<i64>, now_ms: i64, default_timeout_ms: u64) -> Duration {
    let default_ms = i64::try_from(default_timeout_ms).unwrap_or(i64::MAX);
    let deadline_ms = deadline_ms.unwrap_or_else(|| now_ms.saturating_add(default_ms));
    let remaining = deadline_ms.saturating_sub(now_ms).max(1);
    Duration::from_millis(remaining as u64)
}

/// Serves invocations one at a time.
pub struct InvocationServer<H: Handler> {
    client: RuntimeApiClient,
    handler: Arc<H>,
    deps: Option<Arc<H::Deps>>,
    default_timeout_ms: u64,
    state: RequestState,
}

impl<H: Handler> std::fmt::Debug for InvocationServer<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationServer")
            .field("client", &self.client)
            .field("deps", &self.deps.as_ref().map(|_| "..."))
            .field("default_timeout_ms", &self.default_timeout_ms)
            .field("state", &self.state)
            .finish()
    }
}

impl<H: Handler> InvocationServer<H> {
    /// Create a server from an existing client.
    pub fn new(client: RuntimeApiClient, handler: H, deps: Option<Arc<H::Deps>>) -> Self {
        Self {
            client,
            handler: Arc::new(handler),
            deps,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            state: RequestState::default(),
        }
    }

    /// Create a server and its client from configuration.
    pub fn from_config(config: &BridgeConfig, handler: H, deps: Option<Arc<H::Deps>>) -> Result<Self> {
        let client = RuntimeApiClient::new(config)?;
        Ok(Self::new(client, handler, deps).with_default_timeout_ms(config.default_timeout_ms))
    }

    /// Set the budget used when an invocation carries no deadline.
    pub fn with_default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// Request id of the invocation in flight, if any.
    pub fn current_request_id(&self) -> Option<&str> {
        self.state.request_id.as_deref()
    }

    /// Serve invocations until the control plane fails.
    ///
    /// The returned error has already been reported to the control plane on a
    /// best-effort basis.
    pub async fn run(mut self) -> Result<()> {
        info!("Invocation loop started");
        loop {
            if let Err(e) = self.serve_one().await {
                self.report_fatal(&e).await;
                return Err(e);
            }
        }
    }

    /// Run exactly one poll/dispatch/report cycle.
    pub async fn serve_one(&mut self) -> Result<CycleReport> {
        let request = self.client.next_invocation().await?;

        self.state.clear();
        self.state.adopt(&request);

        let result = self.dispatch(request).await;

        self.state.clear();
        result
    }

    async fn dispatch(&self, request: InvocationRequest) -> Result<CycleReport> {
        let request_id = request.request_id.clone();
        let span = info_span!(
            "invocation",
            request_id = %request.request_id,
            trace_id = %request.trace_id,
        );

        let budget = compute_budget(
            request.deadline_ms,
            Utc::now().timestamp_millis(),
            self.default_timeout_ms,
        );

        let outcome = self.race(request, budget).instrument(span.clone()).await;

        self.report(&request_id, outcome).instrument(span).await
    }

    async fn race(&self, request: InvocationRequest, budget: Duration) -> InvocationOutcome {
        let cancellation = CancellationToken::new();
        // Cancels on every exit path, including when this future is dropped.
        let _guard = cancellation.clone().drop_guard();

        let (event, context) = request.into_parts(cancellation);
        let handler = Arc::clone(&self.handler);
        let deps = self.deps.clone();

        let task = tokio::spawn(
            async move { handler.invoke(event, context, deps).await }.in_current_span(),
        );

        match tokio::time::timeout(budget, task).await {
            Ok(Ok(Ok(response))) => format_response(response),
            Ok(Ok(Err(failure))) => InvocationOutcome::Failed(failure),
            Ok(Err(join_error)) => {
                if join_error.is_panic() {
                    InvocationOutcome::Failed(Failure::from_panic(join_error.into_panic()))
                } else {
                    InvocationOutcome::Failed(Failure::new(
                        "Cancelled",
                        "handler task was cancelled",
                    ))
                }
            }
            Err(_) => {
                warn!(budget_ms = budget.as_millis() as u64, "Invocation timed out");
                InvocationOutcome::TimedOut
            }
        }
    }

    async fn report(&self, request_id: &str, outcome: InvocationOutcome) -> Result<CycleReport> {
        let request_id_owned = request_id.to_string();

        match outcome {
            InvocationOutcome::Response(envelope) => {
                let status_code = envelope.status_code;
                let payload = serde_json::to_value(&envelope)?;
                self.client.post_response(request_id, &payload).await?;
                Ok(CycleReport::Response {
                    request_id: request_id_owned,
                    status_code,
                })
            }
            InvocationOutcome::NoContent => {
                let payload = serde_json::to_value(ResponseEnvelope::no_content())?;
                self.client.post_response(request_id, &payload).await?;
                Ok(CycleReport::NoContent {
                    request_id: request_id_owned,
                })
            }
            InvocationOutcome::TimedOut => {
                let failure = Failure::new("TimeoutError", TIMEOUT_MESSAGE);
                self.client
                    .post_error(request_id, ReportKind::TimeoutError, &failure)
                    .await?;
                Ok(CycleReport::TimedOut {
                    request_id: request_id_owned,
                })
            }
            InvocationOutcome::Failed(failure) => {
                error!(error = %failure, "Invocation failed");
                self.client
                    .post_error(request_id, ReportKind::RequestError, &failure)
                    .await?;
                Ok(CycleReport::Failed {
                    request_id: request_id_owned,
                })
            }
        }
    }

    /// Best-effort report of an error that ends the loop.
    ///
    /// Transport failures are only logged: the control plane that just failed
    /// is the one the report would go to.
    async fn report_fatal(&self, err: &BridgeError) {
        error!(error = %err, "Invocation loop stopped");

        let kind = err.report_kind();
        if kind == ReportKind::TransportError {
            return;
        }

        let failure = Failure::new(kind.as_str(), err.to_string());
        if let Err(report_err) = self.client.post_init_error(kind, &failure).await {
            warn!(error = %report_err, "Could not report fatal error to control plane");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_budget_from_deadline() {
        assert_eq!(
            compute_budget(Some(NOW + 5_000), NOW, 60_000),
            Duration::from_millis(5_000)
        );
    }

    #[test]
    fn test_budget_without_deadline_uses_default() {
        assert_eq!(
            compute_budget(None, NOW, 60_000),
            Duration::from_millis(60_000)
        );
        assert_eq!(compute_budget(None, NOW, 250), Duration::from_millis(250));
    }

    #[test]
    fn test_budget_floor_is_one_ms() {
        assert_eq!(compute_budget(Some(NOW), NOW, 60_000), Duration::from_millis(1));
        assert_eq!(
            compute_budget(Some(NOW - 10_000), NOW, 60_000),
            Duration::from_millis(1)
        );
        assert_eq!(compute_budget(Some(0), NOW, 60_000), Duration::from_millis(1));
    }

    #[test]
    fn test_request_state_clear() {
        let mut state = RequestState::default();
        state.adopt(&InvocationRequest {
            request_id: "req-1".into(),
            trace_id: "trace-1".into(),
            function_arn: "arn".into(),
            deadline_ms: None,
            event: serde_json::Value::Null,
        });
        assert_eq!(state.request_id.as_deref(), Some("req-1"));

        state.clear();
        assert!(state.request_id.is_none());
        assert!(state.trace_id.is_none());
    }

    #[test]
    fn test_cycle_report_request_id() {
        let report = CycleReport::TimedOut {
            request_id: "abc".into(),
        };
        assert_eq!(report.request_id(), "abc");
    }
}
