// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Handler responses and their conversion into the platform's response
//! envelope.
//!
//! The text/base64 split is fixed by the platform's response renderer: a body
//! is sent as text only when the content type is `text/*` or
//! `application/json`. Everything else, including a missing content type, is
//! base64-encoded raw bytes.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::failure::Failure;

/// Body produced by a handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    /// No body
    #[default]
    Empty,
    /// UTF-8 text
    Text(String),
    /// Raw bytes
    Binary(Vec<u8>),
    /// A JSON document, serialized compactly
    Json(Value),
}

impl Body {
    /// Raw bytes of the body.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Body::Empty => Vec::new(),
            Body::Text(s) => s.as_bytes().to_vec(),
            Body::Binary(b) => b.clone(),
            // Serializing a Value into memory cannot fail
            Body::Json(v) => serde_json::to_vec(v).unwrap_or_default(),
        }
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Body::Binary(b)
    }
}

impl From<Value> for Body {
    fn from(v: Value) -> Self {
        Body::Json(v)
    }
}

/// Raw result of a handler invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    /// HTTP status code
    pub status_code: u16,
    /// Response headers
    pub headers: BTreeMap<String, String>,
    /// Response body
    pub body: Body,
}

impl HandlerResponse {
    /// A response with the given status and no headers or body.
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: BTreeMap::new(),
            body: Body::Empty,
        }
    }

    /// A `200 OK` JSON response.
    pub fn json(value: Value) -> Self {
        Self::new(200)
            .with_header("content-type", "application/json")
            .with_body(value)
    }

    /// A `200 OK` plain text response.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(200)
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_body(Body::Text(text.into()))
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Content type, looked up case-insensitively.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }
}

/// Response envelope posted to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    /// HTTP status code
    pub status_code: u16,
    /// Response headers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    /// Whether `body` is base64-encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_base64_encoded: Option<bool>,
    /// Body, text or base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl ResponseEnvelope {
    /// Envelope reported when a handler produced no response.
    pub fn no_content() -> Self {
        Self {
            status_code: 200,
            headers: None,
            is_base64_encoded: None,
            body: None,
        }
    }
}

/// Terminal outcome of one invocation.
#[derive(Debug)]
pub enum InvocationOutcome {
    /// The handler produced a response
    Response(ResponseEnvelope),
    /// The handler produced nothing
    NoContent,
    /// The budget ran out first
    TimedOut,
    /// The handler failed or panicked
    Failed(Failure),
}

/// Whether a body with this content type must be base64-encoded.
pub fn is_binary_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(mime) => {
            let mime = mime.trim_start().to_ascii_lowercase();
            !mime.starts_with("text/") && !mime.starts_with("application/json")
        }
    }
}

/// Convert a handler result into an outcome.
pub fn format_response(raw: Option<HandlerResponse>) -> InvocationOutcome {
    let Some(response) = raw else {
        return InvocationOutcome::NoContent;
    };

    let is_base64_encoded = is_binary_content_type(response.content_type());
    let bytes = response.body.to_bytes();
    let body = if is_base64_encoded {
        BASE64.encode(&bytes)
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };

    InvocationOutcome::Response(ResponseEnvelope {
        status_code: response.status_code,
        headers: (!response.headers.is_empty()).then_some(response.headers),
        is_base64_encoded: Some(is_base64_encoded),
        body: Some(body),
    })
}
