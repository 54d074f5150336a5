// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Webhook delivery for alert events.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use flowdesk_core::events::{Alert, NotificationSink, SinkError};

/// Sink that POSTs each alert as JSON to a configured webhook.
///
/// One delivery attempt per alert; the receiving side owns queuing and
/// retries. Jobs treat a failed delivery as a warning, never a run failure.
pub struct WebhookSink {
    http: reqwest::Client,
    url: String,
}

impl WebhookSink {
    /// Create a sink targeting the given webhook URL.
    pub fn new(url: impl Into<String>) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SinkError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, alert: Alert) -> Result<(), SinkError> {
        debug!(alert = ?alert, "Delivering alert to webhook");

        let response = self
            .http
            .post(&self.url)
            .json(&alert)
            .send()
            .await
            .map_err(|e| SinkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SinkError(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
