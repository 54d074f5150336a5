// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interface and backends for flowdesk-core.
//!
//! The [`Store`] trait is the seam the batch jobs are written against;
//! [`PostgresStore`] is the production backend. The free functions in
//! [`postgres`] are the actual query implementations and may be used directly
//! where a pool is at hand (CLI tooling, tests).

pub mod postgres;

pub use self::postgres::PostgresStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::{
    Client, ClientStatus, Credential, CredentialStatus, Execution, Invoice, InvoiceType, Workflow,
    WorkflowStatus,
};

/// Store interface consumed by the reconciler, health monitor, and invoice
/// lifecycle jobs.
#[async_trait]
pub trait Store: Send + Sync {
    // ------------------------------------------------------------------
    // Clients
    // ------------------------------------------------------------------

    /// List clients in the given lifecycle status.
    async fn get_clients_by_status(&self, status: ClientStatus)
    -> Result<Vec<Client>, CoreError>;

    // ------------------------------------------------------------------
    // Workflows
    // ------------------------------------------------------------------

    /// List workflows in the given status, across all clients.
    async fn get_workflows_by_status(
        &self,
        status: WorkflowStatus,
    ) -> Result<Vec<Workflow>, CoreError>;

    /// List every workflow belonging to a client.
    async fn get_workflows_for_client(&self, client_id: Uuid)
    -> Result<Vec<Workflow>, CoreError>;

    /// Transition a workflow's status.
    ///
    /// Returns `Ok(false)` when the workflow is already in the target status
    /// (no-op). Fails with [`CoreError::NotFound`] for an unknown workflow.
    async fn set_workflow_status(
        &self,
        workflow_id: Uuid,
        status: WorkflowStatus,
    ) -> Result<bool, CoreError>;

    /// Write the two denormalized health fields. Only the health monitor
    /// calls this.
    async fn update_workflow_health(
        &self,
        workflow_id: Uuid,
        success_rate: Option<f64>,
        last_execution_at: Option<NaiveDate>,
    ) -> Result<(), CoreError>;

    // ------------------------------------------------------------------
    // Executions
    // ------------------------------------------------------------------

    /// Insert or replace the daily aggregate for (workflow, date).
    ///
    /// Counts are replaced, not accumulated: the engine is the source of
    /// truth for a day's totals, so re-reconciling the same window converges
    /// instead of double counting.
    async fn upsert_execution(
        &self,
        workflow_id: Uuid,
        client_id: Uuid,
        date: NaiveDate,
        total: i32,
        success: i32,
        error: i32,
    ) -> Result<(), CoreError>;

    /// Fetch aggregates for a workflow with `from <= execution_date <= to`.
    async fn get_executions_in_range(
        &self,
        workflow_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Execution>, CoreError>;

    // ------------------------------------------------------------------
    // Invoices
    // ------------------------------------------------------------------

    /// Create a pending invoice, assigning the next sequential invoice
    /// number atomically.
    async fn create_invoice(
        &self,
        client_id: Uuid,
        amount: Decimal,
        invoice_type: InvoiceType,
        due_date: NaiveDate,
    ) -> Result<Invoice, CoreError>;

    /// Fetch a single invoice.
    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, CoreError>;

    /// Transition an invoice's status through the state machine.
    ///
    /// Illegal transitions (anything out of `paid`, or `overdue -> pending`)
    /// fail with [`CoreError::InvariantViolation`]. A legal transition that
    /// loses a race with a concurrent writer returns `Ok(false)`.
    async fn set_invoice_status(
        &self,
        invoice_id: Uuid,
        to: crate::model::InvoiceStatus,
    ) -> Result<bool, CoreError>;

    /// Record payment. No-op returning `Ok(false)` when already paid.
    async fn mark_invoice_paid(
        &self,
        invoice_id: Uuid,
        paid_date: NaiveDate,
    ) -> Result<bool, CoreError>;

    /// Pending invoices whose due date has passed as of `asof`.
    async fn get_overdue_candidates(&self, asof: NaiveDate) -> Result<Vec<Invoice>, CoreError>;

    /// Pending and overdue invoices due within the reminder horizon
    /// (3 days) of `asof`, or already past due.
    async fn get_invoices_due_for_reminder(
        &self,
        asof: NaiveDate,
    ) -> Result<Vec<Invoice>, CoreError>;

    // ------------------------------------------------------------------
    // Credentials
    // ------------------------------------------------------------------

    /// Fetch a client's credential for a service, if one is stored.
    async fn get_credential(
        &self,
        client_id: Uuid,
        service_name: &str,
    ) -> Result<Option<Credential>, CoreError>;

    /// Update a credential's verification status.
    async fn set_credential_status(
        &self,
        credential_id: Uuid,
        status: CredentialStatus,
    ) -> Result<(), CoreError>;
}
