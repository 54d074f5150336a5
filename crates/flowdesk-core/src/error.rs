// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for flowdesk-core.

use thiserror::Error;

/// Result type using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur during persistence and entity operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Unique-constraint violation (concurrent writers raced on a natural key).
    ///
    /// Callers retry the single operation once, then record it as skipped.
    #[error("Conflict on {entity}: {detail}")]
    Conflict {
        /// The entity whose constraint was violated.
        entity: &'static str,
        /// Database detail message.
        detail: String,
    },

    /// A referenced entity does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// The entity kind.
        entity: &'static str,
        /// The identifier that was not found.
        id: String,
    },

    /// An illegal status transition was attempted.
    ///
    /// Treated as a logged no-op at the job layer, never a crash.
    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvariantViolation {
        /// The entity kind.
        entity: &'static str,
        /// Status the entity is currently in.
        from: String,
        /// Status the caller tried to move to.
        to: String,
    },

    /// Credential encryption or decryption failed.
    #[error("Credential cipher error: {0}")]
    Crypto(String),

    /// Input validation failed.
    #[error("Validation error for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: &'static str,
        /// The validation error message.
        message: String,
    },
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            // 23505 = unique_violation
            if db_err.code().as_deref() == Some("23505") {
                return CoreError::Conflict {
                    entity: "row",
                    detail: db_err.message().to_string(),
                };
            }
        }
        CoreError::Database(err)
    }
}

impl CoreError {
    /// True when the error is a unique-constraint conflict worth retrying once.
    pub fn is_conflict(&self) -> bool {
        matches!(self, CoreError::Conflict { .. })
    }

    /// Attach the entity name to a conflict raised by a raw sqlx call.
    pub fn for_entity(self, entity: &'static str) -> Self {
        match self {
            CoreError::Conflict { detail, .. } => CoreError::Conflict { entity, detail },
            other => other,
        }
    }
}
