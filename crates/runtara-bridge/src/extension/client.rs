// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client for the extensions API.

use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tracing::{debug, info, instrument};

use super::{EventKind, ExtensionEvent, ExtensionRegistration};
use crate::client::{check_status, required_header};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

/// Extension name header on `register`.
pub const EXTENSION_NAME_HEADER: &str = "lambda-extension-name";
/// Identifier header returned by `register` and sent on `event/next`.
pub const EXTENSION_ID_HEADER: &str = "lambda-extension-identifier";

#[derive(Serialize)]
struct RegisterBody<'a> {
    events: &'a [EventKind],
}

/// Client for `/2020-01-01/extension/`.
#[derive(Debug, Clone)]
pub struct ExtensionClient {
    http: reqwest::Client,
    base_url: String,
}

impl ExtensionClient {
    /// Create a client for the configured control plane. No request timeout
    /// is set: `event/next` blocks until the platform has an event.
    pub fn new(config: &BridgeConfig) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: config.extension_base_url(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Register for the given lifecycle events.
    #[instrument(skip(self, events))]
    pub async fn register(&self, name: &str, events: &[EventKind]) -> Result<ExtensionRegistration> {
        let response = self
            .http
            .post(self.url("register"))
            .header(EXTENSION_NAME_HEADER, name)
            .json(&RegisterBody { events })
            .send()
            .await?;

        let response = check_status(response).await.map_err(|e| match e {
            BridgeError::Status { status, body } => {
                BridgeError::Registration(format!("register failed [status: {}] {}", status, body))
            }
            other => other,
        })?;

        let extension_id = required_header(response.headers(), EXTENSION_ID_HEADER)
            .map_err(|_| {
                BridgeError::Registration(format!("response has no {} header", EXTENSION_ID_HEADER))
            })?;

        info!(extension_id = %extension_id, "Extension registered");

        Ok(ExtensionRegistration {
            extension_id,
            events: events.to_vec(),
        })
    }

    /// Block until the next lifecycle event.
    #[instrument(skip(self, registration), fields(extension_id = %registration.extension_id))]
    pub async fn next_event(&self, registration: &ExtensionRegistration) -> Result<ExtensionEvent> {
        let response = self
            .http
            .get(self.url("event/next"))
            .header(CONTENT_TYPE, "application/json")
            .header(EXTENSION_ID_HEADER, &registration.extension_id)
            .send()
            .await?;
        let response = check_status(response).await?;

        let body = response.bytes().await?;
        let event: ExtensionEvent = serde_json::from_slice(&body)
            .map_err(|e| BridgeError::MalformedPayload(e.to_string()))?;

        debug!(event_type = %event.event_type, "Received extension event");
        Ok(event)
    }
}
