// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Extension event loop.
//!
//! Mirrors the invocation loop against the extensions API: register once,
//! then block for lifecycle events and hand each to an [`EventListener`].
//! There is no deadline and nothing to report back; consuming the event is
//! the acknowledgement. Registration failures and fetch failures both end the
//! loop with an error.

mod client;

use std::fmt;
use std::ops::ControlFlow;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span};

use crate::config::BridgeConfig;
use crate::error::Result;

pub use client::{EXTENSION_ID_HEADER, EXTENSION_NAME_HEADER, ExtensionClient};

/// Lifecycle event kinds an extension can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    /// An invocation started
    Invoke,
    /// The execution environment is shutting down
    Shutdown,
}

impl EventKind {
    /// Wire name, e.g. `SHUTDOWN`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Invoke => "INVOKE",
            EventKind::Shutdown => "SHUTDOWN",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity obtained from a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRegistration {
    /// Identifier sent with every `event/next` call
    pub extension_id: String,
    /// Events this extension subscribed to
    pub events: Vec<EventKind>,
}

/// A lifecycle event delivered by `event/next`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionEvent {
    /// Event type as sent by the platform, e.g. `INVOKE`
    #[serde(default)]
    pub event_type: String,
    /// Deadline of the current invocation, epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<i64>,
    /// Request id (`INVOKE` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Invoked function ARN (`INVOKE` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoked_function_arn: Option<String>,
    /// Why the environment is shutting down (`SHUTDOWN` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown_reason: Option<String>,
    /// Any other fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExtensionEvent {
    /// Parsed event kind, if known.
    pub fn kind(&self) -> Option<EventKind> {
        match self.event_type.as_str() {
            "INVOKE" => Some(EventKind::Invoke),
            "SHUTDOWN" => Some(EventKind::Shutdown),
            _ => None,
        }
    }
}

/// Reacts to lifecycle events.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Handle one event; `Break` ends the loop.
    async fn on_event(&self, event: &ExtensionEvent) -> ControlFlow<()>;
}

/// Logs every event and stops after `SHUTDOWN`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

#[async_trait]
impl EventListener for LoggingListener {
    async fn on_event(&self, event: &ExtensionEvent) -> ControlFlow<()> {
        info!(
            event_type = %event.event_type,
            request_id = ?event.request_id,
            deadline_ms = ?event.deadline_ms,
            shutdown_reason = ?event.shutdown_reason,
            "Received execution event"
        );

        match event.kind() {
            Some(EventKind::Shutdown) => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        }
    }
}

/// Registers an extension and consumes its lifecycle events.
pub struct ExtensionLoop<L> {
    client: ExtensionClient,
    name: String,
    events: Vec<EventKind>,
    listener: L,
}

impl<L> fmt::Debug for ExtensionLoop<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionLoop")
            .field("client", &self.client)
            .field("name", &self.name)
            .field("events", &self.events)
            .finish()
    }
}

impl<L: EventListener> ExtensionLoop<L> {
    /// Create a loop from an existing client.
    pub fn new(
        client: ExtensionClient,
        name: impl Into<String>,
        events: Vec<EventKind>,
        listener: L,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            events,
            listener,
        }
    }

    /// Create a loop and its client from configuration.
    pub fn from_config(config: &BridgeConfig, events: Vec<EventKind>, listener: L) -> Result<Self> {
        let client = ExtensionClient::new(config)?;
        Ok(Self::new(client, config.extension_name.clone(), events, listener))
    }

    /// Register, then consume events until the listener breaks or the control
    /// plane fails.
    pub async fn run(self) -> Result<()> {
        info!(name = %self.name, "Registering extension...");
        let registration = self.client.register(&self.name, &self.events).await?;

        let span = info_span!("extension", extension_id = %registration.extension_id);
        async {
            info!("Listening for execution events...");
            loop {
                let event = self.client.next_event(&registration).await?;
                if self.listener.on_event(&event).await.is_break() {
                    info!(event_type = %event.event_type, "Extension loop finished");
                    return Ok(());
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run the loop as an independent task.
    pub fn spawn(self) -> JoinHandle<Result<()>>
    where
        L: 'static,
    {
        tokio::spawn(self.run())
    }
}
