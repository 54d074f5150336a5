// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Entity records and status state machines.
//!
//! Every status is an explicit enum backed by a Postgres enum type, with a
//! single `can_transition` predicate per entity. Store operations consult the
//! predicate before writing, so illegal transitions surface as
//! [`CoreError::InvariantViolation`](crate::error::CoreError) instead of
//! silent field writes.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Status Enums
// ============================================================================

/// Client lifecycle status. Transitions are administrator-driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "client_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Active,
    Paused,
    Churned,
}

/// How often a client is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "billing_cycle", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

/// Workflow health status.
///
/// `Active ⇄ Error` is driven solely by the health monitor's success-rate
/// threshold. `Paused` is administrator-only; the monitor never evaluates or
/// touches a paused workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "workflow_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Active,
    Paused,
    Error,
}

impl WorkflowStatus {
    /// Whether a transition from `self` to `to` is legal.
    pub fn can_transition(self, to: WorkflowStatus) -> bool {
        // Any status may move to any other; the predicate exists so that the
        // no-op case is rejected uniformly and future narrowing has one home.
        self != to
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Error => "error",
        }
    }
}

/// Invoice billing status.
///
/// `Paid` is terminal: once an invoice is paid no further transition is
/// permitted. `Overdue` may still be paid; `Pending` may become either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invoice_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    /// Whether a transition from `self` to `to` is legal.
    pub fn can_transition(self, to: InvoiceStatus) -> bool {
        match (self, to) {
            (Self::Pending, Self::Overdue) => true,
            (Self::Pending, Self::Paid) => true,
            (Self::Overdue, Self::Paid) => true,
            _ => false,
        }
    }

    /// True when no further transition is permitted.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Paid)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
        }
    }
}

/// What an invoice bills for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invoice_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceType {
    Setup,
    Monthly,
    Additional,
}

/// Support ticket workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
}

impl TicketStatus {
    /// Whether a transition from `self` to `to` is legal.
    pub fn can_transition(self, to: TicketStatus) -> bool {
        match (self, to) {
            (Self::Open, Self::InProgress) => true,
            (Self::Open, Self::Resolved) => true,
            (Self::InProgress, Self::Resolved) => true,
            // Reopening a resolved ticket goes straight back to in_progress.
            (Self::Resolved, Self::InProgress) => true,
            _ => false,
        }
    }
}

/// Ticket priority, set at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
}

/// Kind of third-party credential stored for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "credential_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    Oauth,
    ApiKey,
    BasicAuth,
}

/// Verification status of a stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "credential_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    Active,
    Expired,
    Invalid,
}

// ============================================================================
// Entity Records
// ============================================================================

/// A client company consuming automation services.
///
/// Root of the ownership tree: workflows, executions, invoices, tickets, and
/// credentials all hang off a client by foreign key.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Client {
    /// Unique identifier.
    pub id: Uuid,
    /// Company name.
    pub company_name: String,
    /// Primary contact person.
    pub contact_name: String,
    /// Contact email (unique).
    pub email: String,
    /// Lifecycle status.
    pub status: ClientStatus,
    /// Plan tier label, e.g. "E-commerce Essentials".
    pub plan_tier: String,
    /// One-time setup fee (>= 0).
    pub setup_fee: Decimal,
    /// Recurring fee per billing cycle (>= 0).
    pub monthly_fee: Decimal,
    /// Billing cadence.
    pub billing_cycle: BillingCycle,
    /// Next date an invoice is expected for this client.
    pub next_billing_date: NaiveDate,
    /// When the client was created.
    pub created_at: DateTime<Utc>,
    /// When the client was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A workflow owned by a client and executed on the external automation engine.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Workflow {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning client.
    pub client_id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    /// Opaque key into the automation engine (unique).
    pub external_id: String,
    /// Health status, maintained by the health monitor.
    pub status: WorkflowStatus,
    /// Most recent aggregate day with executions. Written only by the
    /// health monitor, from Execution aggregates.
    pub last_execution_at: Option<NaiveDate>,
    /// Success rate over the monitor's trailing window at last evaluation.
    /// Written only by the health monitor.
    pub recent_success_rate: Option<f64>,
    /// When the workflow was created.
    pub created_at: DateTime<Utc>,
    /// When the workflow was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Daily execution aggregate for one workflow.
///
/// At most one row exists per (workflow, date); the reconciler enforces this
/// via upsert-merge against the natural-key unique constraint.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Execution {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning client (denormalized from the workflow).
    pub client_id: Uuid,
    /// Workflow the executions belong to.
    pub workflow_id: Uuid,
    /// Day the executions ran.
    pub execution_date: NaiveDate,
    /// Total executions that day.
    pub total_count: i32,
    /// Executions that succeeded.
    pub success_count: i32,
    /// Executions that failed.
    pub error_count: i32,
    /// When the aggregate row was first created.
    pub created_at: DateTime<Utc>,
}

/// An invoice issued to a client.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Invoice {
    /// Unique identifier.
    pub id: Uuid,
    /// Billed client.
    pub client_id: Uuid,
    /// Globally unique, monotonically increasing number. Assigned exactly
    /// once at creation from a database sequence; immutable thereafter.
    pub invoice_number: i64,
    /// Amount due (> 0).
    pub amount: Decimal,
    /// What the invoice bills for.
    pub invoice_type: InvoiceType,
    /// Billing status.
    pub status: InvoiceStatus,
    /// Payment deadline.
    pub due_date: NaiveDate,
    /// Day payment was recorded, if any.
    pub paid_date: Option<NaiveDate>,
    /// When the invoice was created.
    pub created_at: DateTime<Utc>,
    /// When the invoice was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Render the invoice number for documents, e.g. `INV-000042`.
    pub fn display_number(&self) -> InvoiceNumber {
        InvoiceNumber(self.invoice_number)
    }

    /// Days until the invoice is due relative to `asof`. Negative when past due.
    pub fn days_until_due(&self, asof: NaiveDate) -> i64 {
        (self.due_date - asof).num_days()
    }
}

/// Display wrapper for invoice numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceNumber(pub i64);

impl fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "INV-{:06}", self.0)
    }
}

/// A customer support ticket. CRUD only; included because ticket activity is
/// a trigger surface for notifications, not part of reconciliation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SupportTicket {
    /// Unique identifier.
    pub id: Uuid,
    /// Client who raised the ticket.
    pub client_id: Uuid,
    /// Short subject line.
    pub subject: String,
    /// Full description.
    pub description: String,
    /// Ticket workflow status.
    pub status: TicketStatus,
    /// Priority set at creation.
    pub priority: TicketPriority,
    /// When the ticket was resolved, if it has been.
    pub resolved_at: Option<DateTime<Utc>>,
    /// When the ticket was created.
    pub created_at: DateTime<Utc>,
}

/// An encrypted third-party credential belonging to a client.
///
/// Only ciphertext is persisted. Decryption happens at point of use by the
/// engine connector and the plaintext is never cached.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Credential {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning client.
    pub client_id: Uuid,
    /// Service the credential authenticates against, e.g. "automation-engine".
    pub service_name: String,
    /// Kind of credential.
    pub credential_type: CredentialType,
    /// AES-256-GCM sealed secret (base64 nonce || ciphertext).
    pub ciphertext: String,
    /// Verification status.
    pub status: CredentialStatus,
    /// When the credential was last verified against the service.
    pub last_verified: Option<DateTime<Utc>>,
    /// When the credential was created.
    pub created_at: DateTime<Utc>,
}
