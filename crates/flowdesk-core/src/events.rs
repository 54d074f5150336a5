// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Alert events and the notification sink seam.
//!
//! Jobs decide *what* to notify and *whether*; delivery is the sink
//! collaborator's concern. Alerts are plain value objects. The de-duplication
//! contract lives in the jobs: alerts fire on state transitions, not while a
//! state persists, so a sink receiving the same alert twice across process
//! restarts is expected and must tolerate at-least-once delivery.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

/// An alert emitted by one of the batch jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Alert {
    /// A workflow's success rate dropped below the configured threshold.
    WorkflowDegraded {
        workflow_id: Uuid,
        success_rate: f64,
        window_days: u32,
    },
    /// An active workflow produced no executions at all in the window.
    WorkflowInactive {
        workflow_id: Uuid,
        last_active_at: Option<NaiveDate>,
    },
    /// A workflow in error recovered above the threshold.
    WorkflowRecovered { workflow_id: Uuid },
    /// An invoice is approaching (or at) its due date.
    InvoiceReminder {
        invoice_id: Uuid,
        days_until_due: i64,
    },
    /// An invoice went (or remains) overdue.
    InvoiceOverdue { invoice_id: Uuid },
    /// A client's engine credential was rejected or could not be resolved.
    /// Raised so an operator is notified out-of-band.
    CredentialFailure { client_id: Uuid, detail: String },
}

/// Delivery failure reported by a sink. Jobs log it and continue; a failed
/// delivery never fails a run.
#[derive(Debug, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct SinkError(pub String);

/// Receiver for alert events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Accept an alert for delivery.
    async fn deliver(&self, alert: Alert) -> Result<(), SinkError>;
}

/// Sink that logs alerts via tracing and drops them. Default when no
/// external sink is configured.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, alert: Alert) -> Result<(), SinkError> {
        tracing::info!(alert = ?alert, "Alert emitted");
        Ok(())
    }
}

/// In-memory sink collecting alerts for inspection in tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    alerts: Mutex<Vec<Alert>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every alert delivered so far.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().expect("sink mutex poisoned").clone()
    }

    /// Number of alerts delivered so far.
    pub fn len(&self) -> usize {
        self.alerts.lock().expect("sink mutex poisoned").len()
    }

    /// True when no alert has been delivered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn deliver(&self, alert: Alert) -> Result<(), SinkError> {
        self.alerts.lock().expect("sink mutex poisoned").push(alert);
        Ok(())
    }
}
