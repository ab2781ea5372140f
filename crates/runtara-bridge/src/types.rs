// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire-level types and header names of the runtime API.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::handler::InvocationContext;

/// Request id header on `invocation/next`.
pub const REQUEST_ID_HEADER: &str = "lambda-runtime-aws-request-id";
/// Trace id header on `invocation/next`.
pub const TRACE_ID_HEADER: &str = "lambda-runtime-trace-id";
/// Function ARN header on `invocation/next`.
pub const FUNCTION_ARN_HEADER: &str = "lambda-runtime-invoked-function-arn";
/// Deadline header (epoch milliseconds) on `invocation/next`.
pub const DEADLINE_MS_HEADER: &str = "lambda-runtime-deadline-ms";
/// Error tag header on error reports.
pub const ERROR_TYPE_HEADER: &str = "lambda-runtime-function-error-type";
/// Content type of error reports.
pub const ERROR_CONTENT_TYPE: &str = "application/vnd.aws.lambda.error+json";

/// One unit of work delivered by the control plane.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    /// Platform-assigned request id, never empty
    pub request_id: String,
    /// Trace propagation token, never empty
    pub trace_id: String,
    /// ARN of the invoked function, never empty
    pub function_arn: String,
    /// Absolute deadline in epoch milliseconds
    pub deadline_ms: Option<i64>,
    /// Event payload; `Null` when the platform sent no body
    pub event: Value,
}

impl InvocationRequest {
    /// Deadline as a timestamp.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline_ms
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    /// Split into the event and the context handed to the handler.
    pub(crate) fn into_parts(self, cancellation: CancellationToken) -> (Value, InvocationContext) {
        let deadline = self.deadline();
        let context = InvocationContext {
            request_id: self.request_id,
            trace_id: self.trace_id,
            function_arn: self.function_arn,
            deadline,
            cancellation,
        };
        (self.event, context)
    }
}
