// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background job evaluating workflow health from execution aggregates.
//!
//! Two independent conditions per workflow, each alerting at most once per
//! evaluation run:
//!
//! - **degraded**: success rate over the trailing window fell below the
//!   threshold (with executions present). The workflow moves to `error` and
//!   a `WorkflowDegraded` alert fires on that transition only — a workflow
//!   sitting in `error` run after run alerts exactly once.
//! - **inactive**: an active workflow produced no aggregate rows at all in
//!   the window. Flagged without a status change; quiet is not erroring.
//!
//! A workflow back at or above the threshold recovers to `active`. Paused
//! workflows are administrator territory and are never evaluated. The
//! monitor is also the only writer of the denormalized
//! `recent_success_rate` / `last_execution_at` workflow fields.

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use flowdesk_core::CoreError;
use flowdesk_core::events::{Alert, NotificationSink};
use flowdesk_core::model::{Workflow, WorkflowStatus};
use flowdesk_core::persistence::Store;

use crate::error::Result;
use crate::lock::JobLock;

/// Lock name for single-flight enforcement.
const JOB_NAME: &str = "check-health";

/// Configuration for the health monitor.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Trailing window of aggregates to evaluate, in days.
    pub window_days: u32,
    /// Success-rate threshold; below it a workflow is degraded.
    pub success_threshold: f64,
    /// Whether recovery above the threshold emits a `WorkflowRecovered`
    /// alert. The status transition itself is unconditional.
    pub emit_recovered: bool,
    /// How often to run.
    pub poll_interval: std::time::Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            success_threshold: 0.80,
            emit_recovered: true,
            poll_interval: std::time::Duration::from_secs(3600),
        }
    }
}

/// Outcome of one health evaluation run.
#[derive(Debug, Clone, Default)]
pub struct HealthSummary {
    /// Workflows evaluated.
    pub checked: u32,
    /// Workflows newly degraded to `error`.
    pub degraded: u32,
    /// Workflows recovered back to `active`.
    pub recovered: u32,
    /// Active workflows flagged inactive.
    pub inactive: u32,
    /// Workflows skipped because they vanished mid-run.
    pub skipped: u32,
}

/// Background job that evaluates workflow success rates and activity.
pub struct HealthMonitor {
    store: Arc<dyn Store>,
    sink: Arc<dyn NotificationSink>,
    config: HealthConfig,
    single_flight: Option<String>,
    shutdown: Arc<Notify>,
}

impl HealthMonitor {
    /// Create a new health monitor.
    pub fn new(
        store: Arc<dyn Store>,
        sink: Arc<dyn NotificationSink>,
        config: HealthConfig,
    ) -> Self {
        Self {
            store,
            sink,
            config,
            single_flight: None,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Enforce single-flight via an advisory lock on the given database.
    pub fn with_single_flight(mut self, database_url: impl Into<String>) -> Self {
        self.single_flight = Some(database_url.into());
        self
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the health monitor loop until shutdown is signalled.
    pub async fn run(&self) {
        info!(
            window_days = self.config.window_days,
            success_threshold = self.config.success_threshold,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Health monitor started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Health monitor received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Health monitor interrupted mid-run");
                    break;
                }

                result = self.run_guarded() => match result {
                    Ok(Some(summary)) => info!(
                        checked = summary.checked,
                        degraded = summary.degraded,
                        recovered = summary.recovered,
                        inactive = summary.inactive,
                        "Health evaluation complete"
                    ),
                    Ok(None) => {}
                    Err(e) => error!(error = %e, "Health evaluation failed"),
                }
            }
        }

        info!("Health monitor stopped");
    }

    async fn run_guarded(&self) -> Result<Option<HealthSummary>> {
        let guard = match &self.single_flight {
            Some(url) => match JobLock::try_acquire(url, JOB_NAME).await? {
                Some(guard) => Some(guard),
                None => {
                    warn!(job = JOB_NAME, "Previous run still in progress, skipping");
                    return Ok(None);
                }
            },
            None => None,
        };

        let result = self.run_once(Utc::now().date_naive()).await;

        if let Some(guard) = guard {
            guard.release().await;
        }
        result.map(Some)
    }

    /// Evaluate every non-paused workflow against the window ending at `asof`.
    pub async fn run_once(&self, asof: NaiveDate) -> Result<HealthSummary> {
        let mut summary = HealthSummary::default();

        // Paused workflows are excluded by construction: only active and
        // erroring ones are fetched.
        let mut workflows = self
            .store
            .get_workflows_by_status(WorkflowStatus::Active)
            .await?;
        workflows.extend(
            self.store
                .get_workflows_by_status(WorkflowStatus::Error)
                .await?,
        );

        for workflow in workflows {
            match self.evaluate_workflow(&workflow, asof, &mut summary).await {
                Ok(()) => summary.checked += 1,
                Err(CoreError::NotFound { .. }) => {
                    // Deleted between listing and evaluation.
                    debug!(workflow_id = %workflow.id, "Workflow vanished mid-run");
                    summary.skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(summary)
    }

    async fn evaluate_workflow(
        &self,
        workflow: &Workflow,
        asof: NaiveDate,
        summary: &mut HealthSummary,
    ) -> std::result::Result<(), CoreError> {
        let from = asof
            .checked_sub_days(Days::new(u64::from(self.config.window_days.saturating_sub(1))))
            .unwrap_or(asof);

        let rows = self
            .store
            .get_executions_in_range(workflow.id, from, asof)
            .await?;

        let total: i64 = rows.iter().map(|r| i64::from(r.total_count)).sum();
        let success: i64 = rows.iter().map(|r| i64::from(r.success_count)).sum();
        // A silent window is not unhealthy by rate; inactivity is flagged
        // separately below.
        let success_rate = if total > 0 {
            success as f64 / total as f64
        } else {
            1.0
        };
        let last_active = rows
            .iter()
            .filter(|r| r.total_count > 0)
            .map(|r| r.execution_date)
            .max();

        self.store
            .update_workflow_health(workflow.id, Some(success_rate), last_active)
            .await?;

        if total > 0 && success_rate < self.config.success_threshold {
            if workflow.status != WorkflowStatus::Error
                && self
                    .store
                    .set_workflow_status(workflow.id, WorkflowStatus::Error)
                    .await?
            {
                warn!(
                    workflow_id = %workflow.id,
                    success_rate = success_rate,
                    threshold = self.config.success_threshold,
                    "Workflow degraded"
                );
                summary.degraded += 1;
                self.emit(Alert::WorkflowDegraded {
                    workflow_id: workflow.id,
                    success_rate,
                    window_days: self.config.window_days,
                })
                .await;
            }
        } else if workflow.status == WorkflowStatus::Error
            && self
                .store
                .set_workflow_status(workflow.id, WorkflowStatus::Active)
                .await?
        {
            info!(
                workflow_id = %workflow.id,
                success_rate = success_rate,
                "Workflow recovered"
            );
            summary.recovered += 1;
            if self.config.emit_recovered {
                self.emit(Alert::WorkflowRecovered {
                    workflow_id: workflow.id,
                })
                .await;
            }
        }

        if rows.is_empty() && workflow.status == WorkflowStatus::Active {
            debug!(workflow_id = %workflow.id, "Workflow inactive over window");
            summary.inactive += 1;
            self.emit(Alert::WorkflowInactive {
                workflow_id: workflow.id,
                last_active_at: workflow.last_execution_at,
            })
            .await;
        }

        Ok(())
    }

    async fn emit(&self, alert: Alert) {
        if let Err(e) = self.sink.deliver(alert).await {
            warn!(error = %e, "Alert delivery failed");
        }
    }
}
