// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the engine SDK.

use std::time::Duration;

use crate::error::{EngineError, Result};

/// Configuration for the [`EngineClient`](crate::EngineClient).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the engine's REST API, e.g. `https://engine.example.com/api/v1`.
    pub base_url: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Per-request timeout. Every call is bounded; a stuck engine fails the
    /// single call, never the batch.
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5678/api/v1".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with default values.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Create a configuration for localhost development.
    pub fn localhost() -> Self {
        Self::default()
    }

    /// Create a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `FLOWDESK_ENGINE_URL`: Engine API base URL (required)
    /// - `FLOWDESK_ENGINE_CONNECT_TIMEOUT_MS`: Connection timeout in milliseconds (default: 10000)
    /// - `FLOWDESK_ENGINE_REQUEST_TIMEOUT_MS`: Request timeout in milliseconds (default: 30000)
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("FLOWDESK_ENGINE_URL")
            .map_err(|_| EngineError::Config("FLOWDESK_ENGINE_URL is not set".to_string()))?;

        let connect_timeout_ms: u64 = std::env::var("FLOWDESK_ENGINE_CONNECT_TIMEOUT_MS")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .map_err(|e| {
                EngineError::Config(format!("invalid FLOWDESK_ENGINE_CONNECT_TIMEOUT_MS: {}", e))
            })?;

        let request_timeout_ms: u64 = std::env::var("FLOWDESK_ENGINE_REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|_| "30000".to_string())
            .parse()
            .map_err(|e| {
                EngineError::Config(format!("invalid FLOWDESK_ENGINE_REQUEST_TIMEOUT_MS: {}", e))
            })?;

        Ok(Self {
            base_url,
            connect_timeout: Duration::from_millis(connect_timeout_ms),
            request_timeout: Duration::from_millis(request_timeout_ms),
        })
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
