// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for flowdesk-sync.

use thiserror::Error;

/// Job errors. Anything surfacing here aborts the current run (the next
/// scheduled run starts fresh); per-item failures are handled inside the
/// jobs and reported through their summaries instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Core persistence operation failed.
    #[error("Store error: {0}")]
    Core(#[from] flowdesk_core::CoreError),

    /// Engine call failed in a way the job could not absorb.
    #[error("Engine error: {0}")]
    Engine(#[from] flowdesk_engine_sdk::EngineError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type using SyncError.
pub type Result<T> = std::result::Result<T, SyncError>;
