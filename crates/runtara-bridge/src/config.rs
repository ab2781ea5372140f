// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bridge configuration, loaded from the function's environment.

use std::env;
use std::path::PathBuf;

/// Default invocation budget when the platform supplies no deadline.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Default name sent when registering an extension.
pub const DEFAULT_EXTENSION_NAME: &str = "runtara-bridge-extension";

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Control plane authority, `host:port` (required)
    pub runtime_api: String,
    /// Root of the deployed function code, if the platform provided it
    pub task_root: Option<PathBuf>,
    /// Handler identifier, if the platform provided it
    pub handler: Option<String>,
    /// Budget used when an invocation carries no deadline (default: 60_000)
    pub default_timeout_ms: u64,
    /// Extra attempts for response/error reports after a transport or 5xx
    /// failure (default: 0, every control plane failure is fatal)
    pub report_retries: u32,
    /// Delay between report attempts in milliseconds (default: 100)
    pub report_retry_delay_ms: u64,
    /// Name sent in `Lambda-Extension-Name` when registering an extension
    pub extension_name: String,
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    ///
    /// # Required Environment Variables
    /// - `AWS_LAMBDA_RUNTIME_API` - Control plane `host:port`
    ///
    /// # Optional Environment Variables
    /// - `LAMBDA_TASK_ROOT` - Task root directory
    /// - `_HANDLER` - Handler identifier
    /// - `RUNTARA_BRIDGE_DEFAULT_TIMEOUT_MS` - Budget without deadline (default: 60000)
    /// - `RUNTARA_BRIDGE_REPORT_RETRIES` - Report retries (default: 0)
    /// - `RUNTARA_BRIDGE_REPORT_RETRY_DELAY_MS` - Delay between retries (default: 100)
    /// - `RUNTARA_BRIDGE_EXTENSION_NAME` - Extension name (default: "runtara-bridge-extension")
    pub fn from_env() -> Result<Self, ConfigError> {
        let runtime_api = env::var("AWS_LAMBDA_RUNTIME_API")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingEnvVar("AWS_LAMBDA_RUNTIME_API"))?;

        let task_root = non_empty_var("LAMBDA_TASK_ROOT").map(PathBuf::from);
        let handler = non_empty_var("_HANDLER");

        let default_timeout_ms =
            parse_var("RUNTARA_BRIDGE_DEFAULT_TIMEOUT_MS")?.unwrap_or(DEFAULT_TIMEOUT_MS);
        let report_retries = parse_var("RUNTARA_BRIDGE_REPORT_RETRIES")?.unwrap_or(0);
        let report_retry_delay_ms =
            parse_var("RUNTARA_BRIDGE_REPORT_RETRY_DELAY_MS")?.unwrap_or(100);

        let extension_name = non_empty_var("RUNTARA_BRIDGE_EXTENSION_NAME")
            .unwrap_or_else(|| DEFAULT_EXTENSION_NAME.to_string());

        Ok(Self {
            runtime_api,
            task_root,
            handler,
            default_timeout_ms,
            report_retries,
            report_retry_delay_ms,
            extension_name,
        })
    }

    /// Create a configuration for the given control plane authority.
    ///
    /// A leading `http://` is accepted and stripped, so a mock server URI can
    /// be passed directly.
    pub fn new(runtime_api: impl Into<String>) -> Self {
        let runtime_api = runtime_api.into();
        let runtime_api = runtime_api
            .strip_prefix("http://")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(runtime_api);

        Self {
            runtime_api,
            task_root: None,
            handler: None,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            report_retries: 0,
            report_retry_delay_ms: 100,
            extension_name: DEFAULT_EXTENSION_NAME.to_string(),
        }
    }

    /// Set the budget used when the platform supplies no deadline.
    pub fn with_default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// Allow a bounded number of retries for report POSTs.
    pub fn with_report_retries(mut self, retries: u32, delay_ms: u64) -> Self {
        self.report_retries = retries;
        self.report_retry_delay_ms = delay_ms;
        self
    }

    /// Set the extension name.
    pub fn with_extension_name(mut self, name: impl Into<String>) -> Self {
        self.extension_name = name.into();
        self
    }

    /// Base URL of the runtime API, e.g. `http://127.0.0.1:9001/2018-06-01/runtime/`.
    pub fn runtime_base_url(&self) -> String {
        format!("http://{}/2018-06-01/runtime/", self.runtime_api)
    }

    /// Base URL of the extensions API, e.g. `http://127.0.0.1:9001/2020-01-01/extension/`.
    pub fn extension_base_url(&self) -> String {
        format!("http://{}/2020-01-01/extension/", self.runtime_api)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        None => Ok(None),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing or empty.
    #[error("Runtime failed to find the '{0}' environment variable")]
    MissingEnvVar(&'static str),
    /// An environment variable could not be parsed.
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue {
        /// Variable name
        name: &'static str,
        /// Raw value
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_config_defaults() {
        let config = BridgeConfig::new("127.0.0.1:9001");
        assert_eq!(config.runtime_api, "127.0.0.1:9001");
        assert_eq!(config.default_timeout_ms, 60_000);
        assert_eq!(config.report_retries, 0);
        assert_eq!(config.extension_name, "runtara-bridge-extension");
        assert!(config.task_root.is_none());
    }

    #[test]
    fn test_new_strips_scheme() {
        let config = BridgeConfig::new("http://127.0.0.1:41234/");
        assert_eq!(config.runtime_api, "127.0.0.1:41234");
    }

    #[test]
    fn test_base_urls() {
        let config = BridgeConfig::new("localhost:9001");
        assert_eq!(
            config.runtime_base_url(),
            "http://localhost:9001/2018-06-01/runtime/"
        );
        assert_eq!(
            config.extension_base_url(),
            "http://localhost:9001/2020-01-01/extension/"
        );
    }

    #[test]
    fn test_builder_pattern() {
        let config = BridgeConfig::new("localhost:9001")
            .with_default_timeout_ms(5_000)
            .with_report_retries(3, 50)
            .with_extension_name("telemetry");

        assert_eq!(config.default_timeout_ms, 5_000);
        assert_eq!(config.report_retries, 3);
        assert_eq!(config.report_retry_delay_ms, 50);
        assert_eq!(config.extension_name, "telemetry");
    }
}
