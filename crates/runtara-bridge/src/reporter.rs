// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Conversion of failures into the platform's error envelope.

use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::failure::Failure;

/// Prefix of the `Lambda-Runtime-Function-Error-Type` header value.
pub const ERROR_TYPE_PREFIX: &str = "RuntimeBridge";

/// `errorType` used when the failure carries no type name.
pub const GENERIC_ERROR_TYPE: &str = "Error";

/// `errorMessage` used when no message can be extracted.
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred";

/// Trace lines containing this marker belong to the bridge and are dropped.
const INTERNAL_FRAME_MARKER: &str = concat!(env!("CARGO_CRATE_NAME"), "::");

/// Error envelope posted to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// Error type name, never empty
    pub error_type: String,
    /// Error message, never empty
    pub error_message: String,
    /// User-relevant trace lines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<Vec<String>>,
}

/// Origin tag attached to every error report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// The handler exceeded its budget
    TimeoutError,
    /// The handler failed or panicked
    RequestError,
    /// The bootstrap failed before serving invocations
    InitError,
    /// The control plane sent something the bridge cannot use
    ProtocolError,
    /// The control plane could not be reached or rejected a call
    TransportError,
}

impl ReportKind {
    /// Bare kind name, e.g. `TimeoutError`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::TimeoutError => "TimeoutError",
            ReportKind::RequestError => "RequestError",
            ReportKind::InitError => "InitError",
            ReportKind::ProtocolError => "ProtocolError",
            ReportKind::TransportError => "TransportError",
        }
    }

    /// Header value, e.g. `RuntimeBridge.TimeoutError`.
    pub fn header_value(&self) -> String {
        format!("{}.{}", ERROR_TYPE_PREFIX, self.as_str())
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a failure into an error envelope. Never fails.
pub fn classify(failure: &Failure) -> ErrorEnvelope {
    match failure {
        Failure::Structured {
            name,
            message,
            stack,
        } => {
            let frames = user_frames(stack);
            envelope(
                Some(name.as_str()),
                Some(message.as_str()),
                (!frames.is_empty()).then_some(frames),
            )
        }
        Failure::Dynamic(err) => {
            let message = err.to_string();
            let mut causes = Vec::new();
            let mut source = err.source();
            while let Some(cause) = source {
                causes.push(format!("caused by: {}", cause));
                source = cause.source();
            }
            envelope(None, Some(&message), (!causes.is_empty()).then_some(causes))
        }
        Failure::Value(value) => classify_value(value),
        Failure::Panic(message) => envelope(Some("Panic"), Some(message), None),
    }
}

fn classify_value(value: &Value) -> ErrorEnvelope {
    match value {
        Value::String(s) => envelope(None, Some(s), None),
        Value::Object(map) => {
            let name = map.get("name").and_then(Value::as_str);
            let message = map.get("message").and_then(Value::as_str);
            envelope(name, message, None)
        }
        _ => envelope(None, None, None),
    }
}

/// Drop the bridge's own frames. An `at file:line` line belongs to the symbol
/// line before it and goes with it.
fn user_frames(stack: &[String]) -> Vec<String> {
    let mut frames = Vec::with_capacity(stack.len());
    let mut dropping = false;
    for line in stack {
        if line.trim_start().starts_with("at ") {
            if !dropping {
                frames.push(line.clone());
            }
            continue;
        }
        dropping = line.contains(INTERNAL_FRAME_MARKER);
        if !dropping {
            frames.push(line.clone());
        }
    }
    frames
}

fn envelope(
    name: Option<&str>,
    message: Option<&str>,
    stack_trace: Option<Vec<String>>,
) -> ErrorEnvelope {
    let error_type = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(GENERIC_ERROR_TYPE);
    let error_message = message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(UNKNOWN_ERROR_MESSAGE);

    ErrorEnvelope {
        error_type: error_type.to_string(),
        error_message: error_message.to_string(),
        stack_trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_failure_keeps_name_and_message() {
        let env = classify(&Failure::new("TypeError", "boom"));
        assert_eq!(env.error_type, "TypeError");
        assert_eq!(env.error_message, "boom");
        assert_eq!(env.stack_trace, None);
    }

    #[test]
    fn test_internal_frames_are_filtered() {
        let failure = Failure::new("RangeError", "out of range").with_stack([
            "0: my_function::handle at src/main.rs:12",
            "1: runtara_bridge::server::InvocationServer::dispatch at src/server.rs:200",
            "2: tokio::runtime::task::poll",
        ]);

        let env = classify(&failure);
        assert_eq!(
            env.stack_trace,
            Some(vec![
                "0: my_function::handle at src/main.rs:12".to_string(),
                "2: tokio::runtime::task::poll".to_string(),
            ])
        );
    }

    #[test]
    fn test_location_lines_follow_their_frame() {
        let failure = Failure::new("RangeError", "out of range").with_stack([
            "0: runtara_bridge::failure::Failure::capture",
            "at ./src/failure.rs:50:21",
            "1: orders::handle",
            "at ./src/orders.rs:12:5",
            "2: runtara_bridge::server::InvocationServer::race",
            "at ./src/server.rs:214:30",
        ]);

        assert_eq!(
            classify(&failure).stack_trace,
            Some(vec![
                "1: orders::handle".to_string(),
                "at ./src/orders.rs:12:5".to_string(),
            ])
        );
    }

    #[test]
    fn test_captured_trace_has_no_bridge_locations() {
        let env = classify(&Failure::capture("T", "m"));

        for line in env.stack_trace.unwrap_or_default() {
            assert!(!line.contains(INTERNAL_FRAME_MARKER), "leaked frame: {}", line);
            assert!(!line.contains("src/failure.rs"), "leaked location: {}", line);
            assert!(!line.contains("src/reporter.rs"), "leaked location: {}", line);
        }
    }

    #[test]
    fn test_all_internal_frames_omits_trace() {
        let failure = Failure::new("Error", "x").with_stack(["runtara_bridge::client::post"]);
        assert_eq!(classify(&failure).stack_trace, None);
    }

    #[test]
    fn test_blank_fields_fall_back() {
        let env = classify(&Failure::new("  ", ""));
        assert_eq!(env.error_type, GENERIC_ERROR_TYPE);
        assert_eq!(env.error_message, UNKNOWN_ERROR_MESSAGE);
    }

    #[test]
    fn test_dynamic_error_renders_source_chain() {
        #[derive(Debug)]
        struct Outer(std::io::Error);
        impl fmt::Display for Outer {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("could not load order")
            }
        }
        impl StdError for Outer {
            fn source(&self) -> Option<&(dyn StdError + 'static)> {
                Some(&self.0)
            }
        }

        let failure = Failure::from(Outer(std::io::Error::other("disk on fire")));
        let env = classify(&failure);
        assert_eq!(env.error_type, "Error");
        assert_eq!(env.error_message, "could not load order");
        assert_eq!(
            env.stack_trace,
            Some(vec!["caused by: disk on fire".to_string()])
        );
    }

    #[test]
    fn test_value_failures() {
        let env = classify(&Failure::message("Function timed out"));
        assert_eq!(env.error_type, "Error");
        assert_eq!(env.error_message, "Function timed out");

        let env = classify(&Failure::from_value(json!({"name": "ValidationError", "message": "bad sku"})));
        assert_eq!(env.error_type, "ValidationError");
        assert_eq!(env.error_message, "bad sku");

        let env = classify(&Failure::from_value(json!(42)));
        assert_eq!(env.error_type, "Error");
        assert_eq!(env.error_message, UNKNOWN_ERROR_MESSAGE);

        let env = classify(&Failure::from_value(Value::Null));
        assert_eq!(env.error_message, UNKNOWN_ERROR_MESSAGE);
    }

    #[test]
    fn test_panic_failure() {
        let env = classify(&Failure::Panic("index out of bounds".into()));
        assert_eq!(env.error_type, "Panic");
        assert_eq!(env.error_message, "index out of bounds");

        let env = classify(&Failure::Panic(String::new()));
        assert_eq!(env.error_message, UNKNOWN_ERROR_MESSAGE);
    }

    #[test]
    fn test_envelope_wire_shape() {
        let env = classify(&Failure::new("TypeError", "boom"));
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({"errorType": "TypeError", "errorMessage": "boom"})
        );
    }

    #[test]
    fn test_report_kind_header() {
        assert_eq!(
            ReportKind::TimeoutError.header_value(),
            "RuntimeBridge.TimeoutError"
        );
        assert_eq!(ReportKind::RequestError.to_string(), "RequestError");
    }
}
