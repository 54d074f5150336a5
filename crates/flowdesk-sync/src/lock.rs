// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Single-flight job guard backed by Postgres advisory locks.
//!
//! Each job takes a session-scoped advisory lock keyed by its name before a
//! run, so a job never overlaps a still-running prior invocation of itself —
//! including one held by another process. The guard keeps its own dedicated
//! connection: releasing is explicit in the happy path, and if the run is
//! cancelled or panics the dropped connection closes the session, which
//! releases the lock server-side.

use sqlx::{Connection, PgConnection};
use tracing::debug;

use crate::error::Result;

/// Namespace discriminator for flowdesk advisory locks (first key of the
/// two-int lock space).
const LOCK_NAMESPACE: i32 = 0x464C44; // "FLD"

/// Held advisory lock for one job run.
pub struct JobLock {
    conn: PgConnection,
    job_name: String,
}

impl JobLock {
    /// Try to take the lock for `job_name`.
    ///
    /// Returns `None` when a prior invocation still holds it.
    pub async fn try_acquire(database_url: &str, job_name: &str) -> Result<Option<JobLock>> {
        let mut conn = PgConnection::connect(database_url).await?;

        let acquired: bool =
            sqlx::query_scalar("SELECT pg_try_advisory_lock($1, hashtext($2))")
                .bind(LOCK_NAMESPACE)
                .bind(job_name)
                .fetch_one(&mut conn)
                .await?;

        if !acquired {
            // Closing the connection here; nothing was locked on it.
            let _ = conn.close().await;
            return Ok(None);
        }

        debug!(job = %job_name, "Acquired job lock");
        Ok(Some(JobLock {
            conn,
            job_name: job_name.to_string(),
        }))
    }

    /// Release the lock and close the session.
    pub async fn release(mut self) {
        let _ = sqlx::query("SELECT pg_advisory_unlock($1, hashtext($2))")
            .bind(LOCK_NAMESPACE)
            .bind(&self.job_name)
            .execute(&mut self.conn)
            .await;
        let _ = self.conn.close().await;
        debug!(job = %self.job_name, "Released job lock");
    }
}
