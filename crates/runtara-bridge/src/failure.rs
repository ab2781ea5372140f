// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The failure value a handler produces instead of a response.

use std::any::Any;
use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use serde_json::Value;

/// Why an invocation failed.
///
/// Any `std::error::Error` converts into a `Failure`, so handlers can use `?`
/// freely. Use [`Failure::new`] or [`Failure::capture`] when the platform
/// should see a specific error type name.
#[derive(Debug)]
pub enum Failure {
    /// A named error with an optional trace.
    Structured {
        /// Error type name, e.g. `TypeError`
        name: String,
        /// Human readable message
        message: String,
        /// Trace lines, innermost first
        stack: Vec<String>,
    },
    /// Any Rust error.
    Dynamic(Box<dyn StdError + Send + Sync + 'static>),
    /// An arbitrary value raised by the handler.
    Value(Value),
    /// The handler task panicked.
    Panic(String),
}

impl Failure {
    /// A named failure without a trace.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Failure::Structured {
            name: name.into(),
            message: message.into(),
            stack: Vec::new(),
        }
    }

    /// A named failure carrying the current backtrace.
    ///
    /// Frames from this crate are dropped when the failure is reported.
    pub fn capture(name: impl Into<String>, message: impl Into<String>) -> Self {
        let stack = Backtrace::force_capture()
            .to_string()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();

        Failure::Structured {
            name: name.into(),
            message: message.into(),
            stack,
        }
    }

    /// Attach trace lines to a structured failure. Other variants are
    /// returned unchanged.
    pub fn with_stack<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self {
            Failure::Structured { name, message, .. } => Failure::Structured {
                name,
                message,
                stack: lines.into_iter().map(Into::into).collect(),
            },
            other => other,
        }
    }

    /// Wrap an arbitrary value raised by a handler.
    pub fn from_value(value: Value) -> Self {
        Failure::Value(value)
    }

    /// A plain message with no type information.
    pub fn message(message: impl Into<String>) -> Self {
        Failure::Value(Value::String(message.into()))
    }

    /// Convert a panic payload caught from the handler task.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send + 'static>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            String::new()
        };
        Failure::Panic(message)
    }
}

impl<E> From<E> for Failure
where
    E: StdError + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Failure::Dynamic(Box::new(err))
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Structured { name, message, .. } => write!(f, "{}: {}", name, message),
            Failure::Dynamic(err) => write!(f, "{}", err),
            Failure::Value(Value::String(s)) => f.write_str(s),
            Failure::Value(value) => write!(f, "{}", value),
            Failure::Panic(message) => write!(f, "handler panicked: {}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_mark_converts_std_errors() {
        fn parse(input: &str) -> Result<i64, Failure> {
            Ok(input.parse::<i64>()?)
        }

        let failure = parse("not a number").unwrap_err();
        assert!(matches!(failure, Failure::Dynamic(_)));
        assert_eq!(failure.to_string(), "invalid digit found in string");
    }

    #[test]
    fn test_with_stack_only_touches_structured() {
        let failure = Failure::new("TypeError", "boom").with_stack(["at handler (index.rs:3)"]);
        match failure {
            Failure::Structured { stack, .. } => assert_eq!(stack, vec!["at handler (index.rs:3)"]),
            other => panic!("unexpected failure: {:?}", other),
        }

        let failure = Failure::message("plain").with_stack(["ignored"]);
        assert!(matches!(failure, Failure::Value(Value::String(_))));
    }

    #[test]
    fn test_capture_records_frames() {
        let failure = Failure::capture("Error", "captured");
        match failure {
            Failure::Structured { stack, .. } => assert!(!stack.is_empty()),
            other => panic!("unexpected failure: {:?}", other),
        }
    }

    #[test]
    fn test_from_panic_payloads() {
        let failure = Failure::from_panic(Box::new("static str"));
        assert_eq!(failure.to_string(), "handler panicked: static str");

        let failure = Failure::from_panic(Box::new(String::from("owned")));
        assert_eq!(failure.to_string(), "handler panicked: owned");

        let failure = Failure::from_panic(Box::new(42_u8));
        assert!(matches!(failure, Failure::Panic(ref m) if m.is_empty()));
    }
}
