// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire types for the automation engine API.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Activation state of a workflow as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineWorkflowStatus {
    /// The workflow is active and will execute on its triggers.
    Active,
    /// The workflow is deactivated on the engine.
    Inactive,
    /// Any status string this SDK version does not know.
    #[serde(other)]
    Unknown,
}

/// Workflow metadata from `GET /workflows/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMeta {
    /// The engine-side workflow ID.
    pub id: String,
    /// Activation state.
    pub status: EngineWorkflowStatus,
    /// When the workflow last executed, if ever.
    #[serde(default)]
    pub last_active_at: Option<DateTime<Utc>>,
}

/// One execution from `GET /workflows/{id}/executions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    /// Day the execution ran (engine-local calendar date).
    pub date: NaiveDate,
    /// Whether the execution finished successfully.
    pub succeeded: bool,
}

/// Paginated executions envelope. The engine caps page size and hands back
/// `nextCursor` until the range is exhausted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionsPage {
    /// Executions on this page.
    pub data: Vec<ExecutionRecord>,
    /// Opaque cursor for the next page, absent on the last one.
    #[serde(default)]
    pub next_cursor: Option<String>,
}
