// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shutdown Extension - a sidecar that logs lifecycle events.
//!
//! Registers for `INVOKE` and `SHUTDOWN`, logs every event and exits when the
//! execution environment shuts down.
//!
//! Run with: AWS_LAMBDA_RUNTIME_API=127.0.0.1:9001 cargo run -p bridge-example --bin shutdown_extension

use runtara_bridge::BridgeConfig;
use runtara_bridge::extension::{EventKind, ExtensionLoop, LoggingListener};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = BridgeConfig::from_env()?;
    info!(name = %config.extension_name, "=== Shutdown Extension ===");

    ExtensionLoop::from_config(
        &config,
        vec![EventKind::Invoke, EventKind::Shutdown],
        LoggingListener,
    )?
    .run()
    .await?;

    info!("Extension exiting");
    Ok(())
}
