// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-client engine connections.
//!
//! Each client authenticates against the automation engine with its own
//! stored credential. The connector hands the reconciler an [`EngineApi`]
//! handle whose bearer token is resolved — looked up and decrypted — at call
//! time. Plaintext is never cached; a rotated credential takes effect on the
//! very next request.

use std::sync::Arc;

use async_trait::async_trait;

use flowdesk_core::crypto::CredentialCipher;
use flowdesk_core::model::Client;
use flowdesk_core::persistence::Store;
use flowdesk_engine_sdk::{
    EngineApi, EngineClient, EngineConfig, EngineError, TokenProvider,
};
use uuid::Uuid;

/// Produces an engine handle for a client.
///
/// The single production implementation is [`CredentialConnector`]; tests
/// substitute a fake to run jobs without an engine.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    /// Build an engine handle authenticated as the given client.
    async fn for_client(&self, client: &Client) -> Result<Arc<dyn EngineApi>, EngineError>;
}

/// Connector that resolves bearer tokens from stored, encrypted credentials.
pub struct CredentialConnector {
    store: Arc<dyn Store>,
    cipher: Arc<CredentialCipher>,
    engine_config: EngineConfig,
    service_name: String,
}

impl CredentialConnector {
    /// Create a connector.
    pub fn new(
        store: Arc<dyn Store>,
        cipher: Arc<CredentialCipher>,
        engine_config: EngineConfig,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cipher,
            engine_config,
            service_name: service_name.into(),
        }
    }
}

#[async_trait]
impl EngineConnector for CredentialConnector {
    async fn for_client(&self, client: &Client) -> Result<Arc<dyn EngineApi>, EngineError> {
        let tokens = CredentialTokenProvider {
            store: self.store.clone(),
            cipher: self.cipher.clone(),
            client_id: client.id,
            service_name: self.service_name.clone(),
        };
        // Resolve once up front so a client with no stored credential fails
        // here, before any workflow fetch is attempted.
        tokens.bearer_token().await?;

        let engine = EngineClient::new(self.engine_config.clone(), Box::new(tokens))?;
        Ok(Arc::new(engine))
    }
}

/// Token provider that loads and decrypts a client's engine credential on
/// every request.
struct CredentialTokenProvider {
    store: Arc<dyn Store>,
    cipher: Arc<CredentialCipher>,
    client_id: Uuid,
    service_name: String,
}

#[async_trait]
impl TokenProvider for CredentialTokenProvider {
    async fn bearer_token(&self) -> Result<String, EngineError> {
        let credential = self
            .store
            .get_credential(self.client_id, &self.service_name)
            .await
            .map_err(|e| EngineError::Credential(format!("credential lookup failed: {}", e)))?
            .ok_or_else(|| {
                EngineError::Credential(format!(
                    "client {} has no '{}' credential",
                    self.client_id, self.service_name
                ))
            })?;

        let plaintext = self
            .cipher
            .open(&credential.ciphertext)
            .map_err(|e| EngineError::Credential(e.to_string()))?;

        Ok(plaintext.as_str().to_owned())
    }
}
