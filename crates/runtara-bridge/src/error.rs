// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bridge-level error types.
//!
//! These describe failures of the bridge itself (configuration, the control
//! plane, the wire format). Failures of the user handler are not errors of
//! this kind: they are captured as [`Failure`](crate::Failure) values and
//! reported to the platform instead.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while talking to the control plane.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BridgeError {
    /// Configuration error (missing or invalid environment variable)
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The control plane returned an incomplete or malformed invocation
    /// (missing header, bad deadline). The loop cannot continue without
    /// request identity.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The control plane returned a body that is not valid JSON
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The control plane could not be reached
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The control plane answered with a non-2xx status
    #[error("control plane returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, as text
        body: String,
    },

    /// Extension registration failed
    #[error("registration failed: {0}")]
    Registration(String),

    /// Serialization of an outbound payload failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Building the handler's dependency context failed
    #[error("initialization failed: {0}")]
    Init(String),
}

impl BridgeError {
    /// Report tag used when this error has to be reported as a fatal failure.
    pub fn report_kind(&self) -> crate::ReportKind {
        use crate::ReportKind;

        match self {
            BridgeError::Protocol(_) | BridgeError::MalformedPayload(_) => {
                ReportKind::ProtocolError
            }
            BridgeError::Transport(_) | BridgeError::Status { .. } => ReportKind::TransportError,
            _ => ReportKind::InitError,
        }
    }

    /// Whether a failed report POST may be retried.
    pub(crate) fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Transport(_) => true,
            BridgeError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Type alias for bridge results.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReportKind;

    #[test]
    fn test_protocol_errors_report_as_protocol() {
        let err = BridgeError::Protocol("missing Lambda-Runtime-Aws-Request-Id".into());
        assert_eq!(err.report_kind(), ReportKind::ProtocolError);

        let err = BridgeError::MalformedPayload("expected value".into());
        assert_eq!(err.report_kind(), ReportKind::ProtocolError);
    }

    #[test]
    fn test_status_retryable_only_for_server_errors() {
        let server = BridgeError::Status {
            status: 502,
            body: String::new(),
        };
        let client = BridgeError::Status {
            status: 413,
            body: "payload too large".into(),
        };

        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert_eq!(server.report_kind(), ReportKind::TransportError);
    }

    #[test]
    fn test_display() {
        let err = BridgeError::Status {
            status: 400,
            body: "bad".into(),
        };
        assert_eq!(err.to_string(), "control plane returned 400: bad");
    }
}
