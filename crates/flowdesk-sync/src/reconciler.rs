// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background job reconciling engine execution history into daily aggregates.
//!
//! For a trailing window of days, the reconciler fetches each workflow's
//! executions from the automation engine, groups them by calendar date, and
//! upserts one aggregate row per (workflow, date). Upserts replace counts —
//! the engine is the source of truth for a day's totals — so re-running any
//! window converges to the same stored state instead of double counting.
//!
//! Failure policy:
//! - transport failures and rate limits skip the single workflow; the run
//!   moves on and the next scheduled run retries
//! - a workflow unknown to the engine is skipped with its own reason
//! - an authentication failure invalidates every remaining workflow of that
//!   client: the rest are skipped, a credential alert goes to the sink, and
//!   the run proceeds with the next client
//!
//! Cancellation stops the job between await points; idempotent upserts make
//! resumption safe without compensating rollback.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use flowdesk_core::events::{Alert, NotificationSink};
use flowdesk_core::model::{ClientStatus, Workflow, WorkflowStatus};
use flowdesk_core::persistence::Store;
use flowdesk_engine_sdk::{EngineApi, EngineError, ExecutionRecord};

use crate::connector::EngineConnector;
use crate::error::Result;
use crate::lock::JobLock;

/// Lock name for single-flight enforcement.
const JOB_NAME: &str = "reconcile";

/// Configuration for the execution reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Trailing window to reconcile, in days (today inclusive).
    pub window_days: u32,
    /// How often to run.
    pub poll_interval: std::time::Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            poll_interval: std::time::Duration::from_secs(900),
        }
    }
}

/// Why a workflow was skipped during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The engine no longer knows the workflow.
    NotFound,
    /// The engine could not be reached; retried on the next run.
    Unreachable,
    /// The engine throttled us; retried on the next run.
    RateLimited,
    /// The client's credential was rejected or could not be resolved.
    AuthFailure,
    /// A store conflict persisted through its one retry.
    Conflict,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::Unreachable => "unreachable",
            Self::RateLimited => "rate_limited",
            Self::AuthFailure => "auth_failure",
            Self::Conflict => "conflict",
        };
        f.write_str(s)
    }
}

/// A workflow the run could not reconcile, with the reason.
#[derive(Debug, Clone)]
pub struct SkippedWorkflow {
    /// The skipped workflow.
    pub workflow_id: Uuid,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Outcome of one reconciler run.
#[derive(Debug, Clone, Default)]
pub struct ReconcileSummary {
    /// Clients whose workflows were processed.
    pub clients: u32,
    /// Workflows fully reconciled.
    pub workflows_reconciled: u32,
    /// Aggregate rows inserted or replaced.
    pub days_upserted: u32,
    /// Workflows skipped, with reasons.
    pub skipped: Vec<SkippedWorkflow>,
}

/// Background job that merges engine execution history into the store.
pub struct ExecutionReconciler {
    store: Arc<dyn Store>,
    connector: Arc<dyn EngineConnector>,
    sink: Arc<dyn NotificationSink>,
    config: ReconcilerConfig,
    single_flight: Option<String>,
    shutdown: Arc<Notify>,
}

impl ExecutionReconciler {
    /// Create a new reconciler.
    pub fn new(
        store: Arc<dyn Store>,
        connector: Arc<dyn EngineConnector>,
        sink: Arc<dyn NotificationSink>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            connector,
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

    /// Run the reconciler loop until shutdown is signalled.
    ///
    /// A shutdown arriving mid-run cancels it between await points; the
    /// partially reconciled window is already correctly merged.
    pub async fn run(&self) {
        info!(
            window_days = self.config.window_days,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Execution reconciler started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Execution reconciler received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Execution reconciler interrupted mid-run");
                    break;
                }

                result = self.run_guarded() => match result {
                    Ok(Some(summary)) => info!(
                        clients = summary.clients,
                        reconciled = summary.workflows_reconciled,
                        days = summary.days_upserted,
                        skipped = summary.skipped.len(),
                        "Reconciliation complete"
                    ),
                    Ok(None) => {}
                    Err(e) => error!(error = %e, "Reconciliation run failed"),
                }
            }
        }

        info!("Execution reconciler stopped");
    }

    /// Run once behind the single-flight guard (when configured).
    async fn run_guarded(&self) -> Result<Option<ReconcileSummary>> {
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

    /// Reconcile the trailing window ending at `asof` for every non-paused
    /// workflow of every active client.
    pub async fn run_once(&self, asof: NaiveDate) -> Result<ReconcileSummary> {
        let window_start = window_start(asof, self.config.window_days);
        let mut summary = ReconcileSummary::default();

        for client in self.store.get_clients_by_status(ClientStatus::Active).await? {
            let workflows: Vec<Workflow> = self
                .store
                .get_workflows_for_client(client.id)
                .await?
                .into_iter()
                .filter(|w| w.status != WorkflowStatus::Paused)
                .collect();

            if workflows.is_empty() {
                continue;
            }

            let engine = match self.connector.for_client(&client).await {
                Ok(engine) => engine,
                Err(err) => {
                    warn!(
                        client_id = %client.id,
                        error = %err,
                        "Could not connect to engine for client, skipping its workflows"
                    );
                    self.emit(Alert::CredentialFailure {
                        client_id: client.id,
                        detail: err.to_string(),
                    })
                    .await;
                    summary.skipped.extend(workflows.iter().map(|w| SkippedWorkflow {
                        workflow_id: w.id,
                        reason: SkipReason::AuthFailure,
                    }));
                    continue;
                }
            };

            summary.clients += 1;
            let mut auth_failed = false;

            for workflow in &workflows {
                if auth_failed {
                    // Credentials are wrong for every workflow of this
                    // client; no point calling the engine again.
                    summary.skipped.push(SkippedWorkflow {
                        workflow_id: workflow.id,
                        reason: SkipReason::AuthFailure,
                    });
                    continue;
                }

                match self
                    .reconcile_workflow(engine.as_ref(), workflow, window_start, asof)
                    .await
                {
                    Ok(days) => {
                        summary.workflows_reconciled += 1;
                        summary.days_upserted += days;
                    }
                    Err(WorkflowFailure::Skip(reason)) => {
                        warn!(
                            workflow_id = %workflow.id,
                            external_id = %workflow.external_id,
                            reason = %reason,
                            "Workflow skipped"
                        );
                        if reason == SkipReason::AuthFailure {
                            auth_failed = true;
                            self.emit(Alert::CredentialFailure {
                                client_id: client.id,
                                detail: format!(
                                    "engine rejected credentials while reconciling workflow {}",
                                    workflow.external_id
                                ),
                            })
                            .await;
                        }
                        summary.skipped.push(SkippedWorkflow {
                            workflow_id: workflow.id,
                            reason,
                        });
                    }
                    Err(WorkflowFailure::Fatal(e)) => return Err(e),
                }
            }
        }

        Ok(summary)
    }

    /// Fetch and merge one workflow's window. Returns the number of day
    /// aggregates written.
    async fn reconcile_workflow(
        &self,
        engine: &dyn EngineApi,
        workflow: &Workflow,
        window_start: NaiveDate,
        asof: NaiveDate,
    ) -> std::result::Result<u32, WorkflowFailure> {
        let records = engine
            .list_executions(&workflow.external_id, window_start, asof)
            .await
            .map_err(classify_engine_error)?;

        let grouped = group_by_date(&records, window_start, asof);
        debug!(
            workflow_id = %workflow.id,
            executions = records.len(),
            days = grouped.len(),
            "Fetched executions"
        );

        let mut days = 0;
        for (date, counts) in grouped {
            self.upsert_with_retry(workflow, date, counts).await?;
            days += 1;
        }

        Ok(days)
    }

    /// Upsert one day's counts, retrying a conflict once before giving up.
    async fn upsert_with_retry(
        &self,
        workflow: &Workflow,
        date: NaiveDate,
        counts: DayCounts,
    ) -> std::result::Result<(), WorkflowFailure> {
        for attempt in 0..2 {
            match self
                .store
                .upsert_execution(
                    workflow.id,
                    workflow.client_id,
                    date,
                    counts.total,
                    counts.success,
                    counts.error,
                )
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if e.is_conflict() && attempt == 0 => {
                    debug!(
                        workflow_id = %workflow.id,
                        date = %date,
                        "Upsert conflict, retrying once"
                    );
                }
                Err(e) if e.is_conflict() => {
                    return Err(WorkflowFailure::Skip(SkipReason::Conflict));
                }
                Err(e) => return Err(WorkflowFailure::Fatal(e.into())),
            }
        }
        unreachable!("upsert loop always returns within two attempts")
    }

    async fn emit(&self, alert: Alert) {
        if let Err(e) = self.sink.deliver(alert).await {
            warn!(error = %e, "Alert delivery failed");
        }
    }
}

/// Per-workflow failure classification.
enum WorkflowFailure {
    /// Skip this workflow (and possibly the client) and continue the run.
    Skip(SkipReason),
    /// Abort the whole run.
    Fatal(crate::error::SyncError),
}

fn classify_engine_error(err: EngineError) -> WorkflowFailure {
    if err.is_auth() {
        WorkflowFailure::Skip(SkipReason::AuthFailure)
    } else {
        match err {
            EngineError::NotFound(_) => WorkflowFailure::Skip(SkipReason::NotFound),
            EngineError::RateLimited => WorkflowFailure::Skip(SkipReason::RateLimited),
            EngineError::Unreachable(_) => WorkflowFailure::Skip(SkipReason::Unreachable),
            // Anything else (unexpected body, config) is a bug or a broken
            // deployment; surface it as unreachable-style skip so one odd
            // workflow cannot take down the batch.
            _ => WorkflowFailure::Skip(SkipReason::Unreachable),
        }
    }
}

/// First day of the trailing window ending at `asof`.
fn window_start(asof: NaiveDate, window_days: u32) -> NaiveDate {
    asof.checked_sub_days(Days::new(u64::from(window_days.saturating_sub(1))))
        .unwrap_or(asof)
}

/// Per-day execution counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DayCounts {
    total: i32,
    success: i32,
    error: i32,
}

/// Group execution records by date, dropping anything outside the window.
/// Days with no executions produce no entry; existing rows for such days are
/// left untouched by design.
fn group_by_date(
    records: &[ExecutionRecord],
    window_start: NaiveDate,
    asof: NaiveDate,
) -> BTreeMap<NaiveDate, DayCounts> {
    let mut grouped: BTreeMap<NaiveDate, DayCounts> = BTreeMap::new();

    for record in records {
        if record.date < window_start || record.date > asof {
            continue;
        }
        let counts = grouped.entry(record.date).or_insert(DayCounts {
            total: 0,
            success: 0,
            error: 0,
        });
        counts.total += 1;
        if record.succeeded {
            counts.success += 1;
        } else {
            counts.error += 1;
        }
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn record(d: u32, succeeded: bool) -> ExecutionRecord {
        ExecutionRecord {
            date: day(d),
            succeeded,
        }
    }

    #[test]
    fn test_window_start_inclusive_of_today() {
        // A 7-day window ending on the 10th starts on the 4th.
        assert_eq!(window_start(day(10), 7), day(4));
        assert_eq!(window_start(day(10), 1), day(10));
    }

    #[test]
    fn test_group_by_date_counts_outcomes() {
        let records = vec![
            record(3, true),
            record(3, true),
            record(3, false),
            record(5, true),
        ];
        let grouped = group_by_date(&records, day(1), day(7));

        assert_eq!(grouped.len(), 2);
        let d3 = grouped[&day(3)];
        assert_eq!((d3.total, d3.success, d3.error), (3, 2, 1));
        let d5 = grouped[&day(5)];
        assert_eq!((d5.total, d5.success, d5.error), (1, 1, 0));
    }

    #[test]
    fn test_group_by_date_drops_out_of_window_records() {
        let records = vec![record(1, true), record(10, true), record(5, false)];
        let grouped = group_by_date(&records, day(2), day(8));
        assert_eq!(grouped.len(), 1);
        assert!(grouped.contains_key(&day(5)));
    }

    #[test]
    fn test_default_config() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.window_days, 7);
        assert_eq!(config.poll_interval, std::time::Duration::from_secs(900));
    }
}
