// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database migrations for flowdesk-core.
//!
//! Migrations are embedded at compile time and applied with [`run`]. Safe to
//! call on every startup; already-applied migrations are skipped.
//!
//! # Example
//!
//! ```ignore
//! use sqlx::PgPool;
//! use flowdesk_core::migrations;
//!
//! let pool = PgPool::connect(&database_url).await?;
//! migrations::run(&pool).await?;
//! ```

use sqlx::migrate::{MigrateError, Migrator};

/// All flowdesk migrations, embedded at compile time.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Apply pending migrations.
pub async fn run(pool: &sqlx::PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}
