// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background job advancing invoices through their billing lifecycle.
//!
//! Daily evaluation:
//! 1. every pending invoice past its due date becomes `overdue` — monotonic,
//!    reversed only by payment — and an `InvoiceOverdue` alert fires on the
//!    transition;
//! 2. pending invoices coming due get an `InvoiceReminder` at fixed offsets
//!    (3 days before, and on the due date itself);
//! 3. invoices already overdue get a repeat `InvoiceOverdue` every 7 days,
//!    anchored to the due date (days 1, 8, 15, … past due).
//!
//! Invoice creation assigns the sequential invoice number inside the store's
//! atomic insert. Payment of an already-paid invoice is a logged no-op;
//! moving a paid invoice anywhere else is rejected by the state machine.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use flowdesk_core::CoreError;
use flowdesk_core::events::{Alert, NotificationSink};
use flowdesk_core::model::{Invoice, InvoiceStatus, InvoiceType};
use flowdesk_core::persistence::Store;

use crate::error::Result;
use crate::lock::JobLock;

/// Lock name for single-flight enforcement.
const JOB_NAME: &str = "process-invoices";

/// Days before the due date on which a pending invoice is reminded.
/// Zero is "due today".
const REMINDER_OFFSETS: [i64; 2] = [3, 0];

/// Repeat interval for overdue notices, anchored to the due date.
const OVERDUE_REPEAT_DAYS: i64 = 7;

/// Configuration for the invoice lifecycle job.
#[derive(Debug, Clone)]
pub struct InvoiceConfig {
    /// How often to run. Reminders are calendar-based, so daily is the
    /// intended cadence; running more often re-sends at most that day's
    /// notices (delivery is at-least-once by contract).
    pub poll_interval: std::time::Duration,
}

impl Default for InvoiceConfig {
    fn default() -> Self {
        Self {
            poll_interval: std::time::Duration::from_secs(86_400),
        }
    }
}

/// Outcome of one invoice lifecycle run.
#[derive(Debug, Clone, Default)]
pub struct InvoiceSummary {
    /// Invoices examined inside the reminder horizon.
    pub examined: u32,
    /// Pending invoices transitioned to overdue.
    pub marked_overdue: u32,
    /// `InvoiceReminder` alerts emitted.
    pub reminders_sent: u32,
    /// `InvoiceOverdue` alerts emitted (transitions and repeats).
    pub overdue_notices: u32,
    /// Invoices skipped because of concurrent status changes.
    pub skipped: u32,
}

/// Background job that advances invoice status and emits billing reminders.
pub struct InvoiceLifecycle {
    store: Arc<dyn Store>,
    sink: Arc<dyn NotificationSink>,
    config: InvoiceConfig,
    single_flight: Option<String>,
    shutdown: Arc<Notify>,
}

impl InvoiceLifecycle {
    /// Create a new invoice lifecycle job.
    pub fn new(
        store: Arc<dyn Store>,
        sink: Arc<dyn NotificationSink>,
        config: InvoiceConfig,
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

    /// Run the invoice lifecycle loop until shutdown is signalled.
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Invoice lifecycle started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Invoice lifecycle received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Invoice lifecycle interrupted mid-run");
                    break;
                }

                result = self.run_guarded() => match result {
                    Ok(Some(summary)) => info!(
                        examined = summary.examined,
                        marked_overdue = summary.marked_overdue,
                        reminders = summary.reminders_sent,
                        overdue_notices = summary.overdue_notices,
                        "Invoice processing complete"
                    ),
                    Ok(None) => {}
                    Err(e) => error!(error = %e, "Invoice processing failed"),
                }
            }
        }

        info!("Invoice lifecycle stopped");
    }

    async fn run_guarded(&self) -> Result<Option<InvoiceSummary>> {
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

    /// Evaluate every invoice against `asof`.
    pub async fn run_once(&self, asof: NaiveDate) -> Result<InvoiceSummary> {
        let mut summary = InvoiceSummary::default();

        // Phase 1: pending and past due -> overdue, alerting on the
        // transition. The set tracks ids so phase 2 does not notice them a
        // second time in the same run.
        let mut transitioned: HashSet<Uuid> = HashSet::new();

        for invoice in self.store.get_overdue_candidates(asof).await? {
            match self
                .store
                .set_invoice_status(invoice.id, InvoiceStatus::Overdue)
                .await
            {
                Ok(true) => {
                    info!(
                        invoice_id = %invoice.id,
                        invoice_number = %invoice.display_number(),
                        due_date = %invoice.due_date,
                        "Invoice overdue"
                    );
                    summary.marked_overdue += 1;
                    summary.overdue_notices += 1;
                    transitioned.insert(invoice.id);
                    self.emit(Alert::InvoiceOverdue {
                        invoice_id: invoice.id,
                    })
                    .await;
                }
                Ok(false) => {
                    // Raced with another writer; whoever won, the stored
                    // state is already consistent.
                    summary.skipped += 1;
                }
                Err(CoreError::InvariantViolation { .. }) => {
                    // Paid between the fetch and the update.
                    debug!(invoice_id = %invoice.id, "Invoice paid before overdue transition");
                    summary.skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Phase 2: reminders. Statuses are re-read after phase 1 so freshly
        // overdue invoices show up as such.
        for invoice in self.store.get_invoices_due_for_reminder(asof).await? {
            summary.examined += 1;
            match invoice.status {
                InvoiceStatus::Pending => {
                    let days_until_due = invoice.days_until_due(asof);
                    if REMINDER_OFFSETS.contains(&days_until_due) {
                        debug!(
                            invoice_id = %invoice.id,
                            days_until_due = days_until_due,
                            "Invoice reminder"
                        );
                        summary.reminders_sent += 1;
                        self.emit(Alert::InvoiceReminder {
                            invoice_id: invoice.id,
                            days_until_due,
                        })
                        .await;
                    }
                }
                InvoiceStatus::Overdue => {
                    if transitioned.contains(&invoice.id) {
                        continue;
                    }
                    let days_overdue = -invoice.days_until_due(asof);
                    if days_overdue >= 1 && (days_overdue - 1) % OVERDUE_REPEAT_DAYS == 0 {
                        debug!(
                            invoice_id = %invoice.id,
                            days_overdue = days_overdue,
                            "Repeat overdue notice"
                        );
                        summary.overdue_notices += 1;
                        self.emit(Alert::InvoiceOverdue {
                            invoice_id: invoice.id,
                        })
                        .await;
                    }
                }
                InvoiceStatus::Paid => {}
            }
        }

        Ok(summary)
    }

    /// Create a pending invoice with the next sequential number.
    pub async fn create_invoice(
        &self,
        client_id: Uuid,
        amount: Decimal,
        invoice_type: InvoiceType,
        due_date: NaiveDate,
    ) -> Result<Invoice> {
        let invoice = self
            .store
            .create_invoice(client_id, amount, invoice_type, due_date)
            .await?;
        info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.display_number(),
            client_id = %client_id,
            amount = %amount,
            "Invoice created"
        );
        Ok(invoice)
    }

    /// Record payment of an invoice. Paying twice is a no-op.
    pub async fn mark_paid(&self, invoice_id: Uuid, paid_date: NaiveDate) -> Result<bool> {
        Ok(self.store.mark_invoice_paid(invoice_id, paid_date).await?)
    }

    async fn emit(&self, alert: Alert) {
        if let Err(e) = self.sink.deliver(alert).await {
            warn!(error = %e, "Alert delivery failed");
        }
    }
}
