// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared helpers for tests that touch the process environment.

#![allow(dead_code)]

use std::env;

/// Every variable the bridge reads.
pub const BRIDGE_VARS: &[&str] = &[
    "AWS_LAMBDA_RUNTIME_API",
    "LAMBDA_TASK_ROOT",
    "_HANDLER",
    "RUNTARA_BRIDGE_DEFAULT_TIMEOUT_MS",
    "RUNTARA_BRIDGE_REPORT_RETRIES",
    "RUNTARA_BRIDGE_REPORT_RETRY_DELAY_MS",
    "RUNTARA_BRIDGE_EXTENSION_NAME",
];

/// Sets env vars for a test and restores them on drop.
pub struct EnvGuard {
    vars: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    /// Start from an environment with none of the bridge variables set.
    pub fn clean() -> Self {
        let mut guard = Self { vars: Vec::new() };
        for key in BRIDGE_VARS {
            guard.remove(key);
        }
        guard
    }

    pub fn set(&mut self, key: &str, value: &str) {
        let old = env::var(key).ok();
        self.vars.push((key.to_string(), old));
        // SAFETY: Tests are marked #[serial], so no concurrent access
        unsafe { env::set_var(key, value) };
    }

    pub fn remove(&mut self, key: &str) {
        let old = env::var(key).ok();
        self.vars.push((key.to_string(), old));
        // SAFETY: Tests are marked #[serial], so no concurrent access
        unsafe { env::remove_var(key) };
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.vars.drain(..).rev() {
            // SAFETY: Tests are marked #[serial], so no concurrent access
            unsafe {
                match value {
                    Some(v) => env::set_var(&key, v),
                    None => env::remove_var(&key),
                }
            }
        }
    }
}
