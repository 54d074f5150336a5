// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! EngineClient for talking to the external automation engine.
//!
//! The client is a thin typed wrapper over the engine's REST API. It holds no
//! cache — every call reflects remote truth at call time — and resolves its
//! bearer credential through a [`TokenProvider`] on each request, so rotated
//! or re-encrypted credentials take effect immediately.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use tracing::{debug, instrument};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::types::{ExecutionRecord, ExecutionsPage, WorkflowMeta};

/// Resolves the bearer credential for engine calls.
///
/// Implementations decrypt stored credentials at point of use; the SDK never
/// caches what they return.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Produce the current bearer token.
    async fn bearer_token(&self) -> Result<String>;
}

/// Token provider backed by a fixed string. Useful for tests and deployments
/// that configure the engine key directly.
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap a fixed token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn bearer_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Capability interface the batch jobs are written against.
///
/// There is exactly one production implementation ([`EngineClient`]); jobs
/// receive it injected rather than constructing it, so tests substitute fakes
/// without any engine running.
#[async_trait]
pub trait EngineApi: Send + Sync {
    /// Fetch workflow metadata.
    async fn get_workflow(&self, external_id: &str) -> Result<WorkflowMeta>;

    /// Fetch executions with `since <= date <= until`, following pagination
    /// to exhaustion.
    async fn list_executions(
        &self,
        external_id: &str,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<ExecutionRecord>>;

    /// Activate or deactivate a workflow on the engine.
    async fn set_active(&self, external_id: &str, active: bool) -> Result<()>;
}

/// HTTP client for the automation engine management API.
pub struct EngineClient {
    http: reqwest::Client,
    config: EngineConfig,
    tokens: Box<dyn TokenProvider>,
}

impl EngineClient {
    /// Create a client with the given configuration and token provider.
    pub fn new(config: EngineConfig, tokens: Box<dyn TokenProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            tokens,
        })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Map an HTTP status into the typed error set, passing successes through.
    fn check_status(
        response: reqwest::Response,
        external_id: &str,
    ) -> Result<reqwest::Response> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(EngineError::NotFound(external_id.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(EngineError::Auth),
            StatusCode::TOO_MANY_REQUESTS => Err(EngineError::RateLimited),
            status => Err(EngineError::Unreachable(format!(
                "engine returned {}",
                status
            ))),
        }
    }
}

#[async_trait]
impl EngineApi for EngineClient {
    #[instrument(skip(self), fields(external_id = %external_id))]
    async fn get_workflow(&self, external_id: &str) -> Result<WorkflowMeta> {
        debug!("Fetching workflow metadata");

        let token = self.tokens.bearer_token().await?;
        let response = self
            .http
            .get(self.url(&format!("workflows/{}", external_id)))
            .bearer_auth(&token)
            .send()
            .await?;

        let meta = Self::check_status(response, external_id)?
            .json::<WorkflowMeta>()
            .await
            .map_err(|e| EngineError::UnexpectedResponse(e.to_string()))?;

        Ok(meta)
    }

    #[instrument(skip(self), fields(external_id = %external_id, since = %since, until = %until))]
    async fn list_executions(
        &self,
        external_id: &str,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<ExecutionRecord>> {
        debug!("Listing executions");

        let mut executions = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let token = self.tokens.bearer_token().await?;
            let mut request = self
                .http
                .get(self.url(&format!("workflows/{}/executions", external_id)))
                .bearer_auth(&token)
                .query(&[
                    ("since", since.to_string()),
                    ("until", until.to_string()),
                ]);
            if let Some(ref c) = cursor {
                request = request.query(&[("cursor", c.as_str())]);
            }

            let response = request.send().await?;
            let page = Self::check_status(response, external_id)?
                .json::<ExecutionsPage>()
                .await
                .map_err(|e| EngineError::UnexpectedResponse(e.to_string()))?;

            executions.extend(page.data);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(count = executions.len(), "Fetched executions");
        Ok(executions)
    }

    #[instrument(skip(self), fields(external_id = %external_id, active = active))]
    async fn set_active(&self, external_id: &str, active: bool) -> Result<()> {
        let action = if active { "activate" } else { "deactivate" };
        debug!(action = action, "Setting workflow activation");

        let token = self.tokens.bearer_token().await?;
        let response = self
            .http
            .post(self.url(&format!("workflows/{}/{}", external_id, action)))
            .bearer_auth(&token)
            .send()
            .await?;

        Self::check_status(response, external_id)?;
        Ok(())
    }
}
