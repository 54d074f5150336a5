// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for flowdesk-engine-sdk.

use thiserror::Error;

/// Result type using EngineError.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors returned by the automation engine client.
///
/// `Unreachable` and `RateLimited` are retryable by the caller (the next
/// scheduled run covers them); `NotFound` and auth failures are not.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The referenced workflow no longer exists on the engine.
    #[error("workflow not found on engine: {0}")]
    NotFound(String),

    /// The engine rejected the bearer credential.
    #[error("authentication rejected by engine")]
    Auth,

    /// The engine throttled the request.
    #[error("rate limited by engine")]
    RateLimited,

    /// Transport failure, timeout, or a 5xx from the engine.
    #[error("engine unreachable: {0}")]
    Unreachable(String),

    /// The bearer credential could not be resolved or decrypted.
    #[error("credential error: {0}")]
    Credential(String),

    /// The engine answered with a body we could not interpret.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Configuration error (missing or invalid values).
    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// True when the caller may retry on a later run.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::RateLimited)
    }

    /// True when the failure is credential-related and therefore fatal for
    /// every workflow of the affected client.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth | Self::Credential(_))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            EngineError::UnexpectedResponse(err.to_string())
        } else {
            // Connect failures, timeouts, and protocol errors all read as
            // the engine being unreachable right now.
            EngineError::Unreachable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(EngineError::Unreachable("timeout".into()).is_retryable());
        assert!(EngineError::RateLimited.is_retryable());
        assert!(!EngineError::NotFound("wf-1".into()).is_retryable());
        assert!(!EngineError::Auth.is_retryable());
    }

    #[test]
    fn test_auth_classification() {
        assert!(EngineError::Auth.is_auth());
        assert!(EngineError::Credential("missing".into()).is_auth());
        assert!(!EngineError::RateLimited.is_auth());
    }
}
