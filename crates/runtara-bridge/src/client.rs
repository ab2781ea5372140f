// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Low-level client for the runtime API control plane.
//!
//! Pure transport: every operation is a single HTTP round trip. Non-2xx
//! answers are errors; nothing here decides what happens next.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::failure::Failure;
use crate::reporter::{ReportKind, classify};
use crate::types::{
    DEADLINE_MS_HEADER, ERROR_CONTENT_TYPE, ERROR_TYPE_HEADER, FUNCTION_ARN_HEADER,
    InvocationRequest, REQUEST_ID_HEADER, TRACE_ID_HEADER,
};

/// Client for `/2018-06-01/runtime/`.
#[derive(Debug, Clone)]
pub struct RuntimeApiClient {
    http: reqwest::Client,
    base_url: String,
    report_retries: u32,
    report_retry_delay: Duration,
}

impl RuntimeApiClient {
    /// Create a client for the configured control plane.
    ///
    /// The underlying HTTP client has no request timeout: `invocation/next`
    /// is a long poll held open by the platform until work arrives.
    pub fn new(config: &BridgeConfig) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            http,
            base_url: config.runtime_base_url(),
            report_retries: config.report_retries,
            report_retry_delay: Duration::from_millis(config.report_retry_delay_ms),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Block until the platform delivers the next invocation.
    #[instrument(skip(self))]
    pub async fn next_invocation(&self) -> Result<InvocationRequest> {
        let response = self.http.get(self.url("invocation/next")).send().await?;
        let response = check_status(response).await?;

        let headers = response.headers();
        let request_id = required_header(headers, REQUEST_ID_HEADER)?;
        let trace_id = required_header(headers, TRACE_ID_HEADER)?;
        let function_arn = required_header(headers, FUNCTION_ARN_HEADER)?;
        let deadline_ms = deadline_header(headers)?;

        let body = response.bytes().await?;
        let event = parse_event(&body)?;

        debug!(request_id = %request_id, deadline_ms = ?deadline_ms, "Received invocation");

        Ok(InvocationRequest {
            request_id,
            trace_id,
            function_arn,
            deadline_ms,
            event,
        })
    }

    /// Report a successful invocation.
    ///
    /// `Null` sends an empty body, a string is sent as raw text, anything
    /// else is serialized as JSON.
    #[instrument(skip(self, payload))]
    pub async fn post_response(&self, request_id: &str, payload: &Value) -> Result<()> {
        let url = self.url(&format!("invocation/{}/response", request_id));
        let body = match payload {
            Value::Null => None,
            Value::String(text) => Some(("text/plain; charset=utf-8", text.clone().into_bytes())),
            other => Some(("application/json", serde_json::to_vec(other)?)),
        };

        self.send_report(|| {
            let request = self.http.post(&url);
            match &body {
                Some((content_type, bytes)) => request
                    .header(CONTENT_TYPE, *content_type)
                    .body(bytes.clone()),
                None => request,
            }
        })
        .await
    }

    /// Report a failed invocation.
    #[instrument(skip(self, failure), fields(kind = %kind))]
    pub async fn post_error(
        &self,
        request_id: &str,
        kind: ReportKind,
        failure: &Failure,
    ) -> Result<()> {
        let path = format!("invocation/{}/error", request_id);
        self.post_failure(&path, kind, failure).await
    }

    /// Report a failure that happened before any invocation was received.
    #[instrument(skip(self, failure), fields(kind = %kind))]
    pub async fn post_init_error(&self, kind: ReportKind, failure: &Failure) -> Result<()> {
        self.post_failure("init/error", kind, failure).await
    }

    async fn post_failure(&self, path: &str, kind: ReportKind, failure: &Failure) -> Result<()> {
        let url = self.url(path);
        let body = serde_json::to_vec(&classify(failure))?;
        let error_type = kind.header_value();

        self.send_report(|| {
            self.http
                .post(&url)
                .header(CONTENT_TYPE, ERROR_CONTENT_TYPE)
                .header(ERROR_TYPE_HEADER, &error_type)
                .body(body.clone())
        })
        .await
    }

    /// Send a report, retrying transport and 5xx failures up to the
    /// configured bound.
    async fn send_report<F>(&self, build: F) -> Result<()>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let result = match build().send().await {
                Ok(response) => check_status(response).await.map(|_| ()),
                Err(e) => Err(BridgeError::Transport(e)),
            };

            match result {
                Err(e) if attempt < self.report_retries && e.is_retryable() => {
                    attempt += 1;
                    warn!(error = %e, attempt, "Report to control plane failed, retrying");
                    tokio::time::sleep(self.report_retry_delay).await;
                }
                other => return other,
            }
        }
    }
}

/// Turn a non-2xx response into [`BridgeError::Status`], logging its body.
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    error!(status = status.as_u16(), url = %url, body = %body, "Control plane rejected request");

    Err(BridgeError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Read a header that must be present and non-empty.
pub(crate) fn required_header(headers: &HeaderMap, name: &str) -> Result<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| BridgeError::Protocol(format!("missing or empty {} header", name)))
}

fn deadline_header(headers: &HeaderMap) -> Result<Option<i64>> {
    let Some(raw) = headers.get(DEADLINE_MS_HEADER) else {
        return Ok(None);
    };

    let text = raw
        .to_str()
        .map_err(|_| BridgeError::Protocol(format!("{} is not valid text", DEADLINE_MS_HEADER)))?
        .trim();
    if text.is_empty() {
        return Ok(None);
    }

    // Zero or negative means the platform set no deadline.
    text.parse::<i64>()
        .map(|ms| (ms > 0).then_some(ms))
        .map_err(|_| {
            BridgeError::Protocol(format!("{} is not a number: {:?}", DEADLINE_MS_HEADER, text))
        })
}

fn parse_event(body: &[u8]) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| BridgeError::MalformedPayload(e.to_string()))
}
