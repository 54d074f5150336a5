// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL persistence operations for flowdesk-core.
//!
//! Free query functions over a [`PgPool`], plus the [`PostgresStore`] wrapper
//! implementing the [`Store`] trait by delegation. Upserts rely on the
//! natural-key unique constraints declared in the schema, which turn
//! concurrent-writer races into retryable conflicts rather than duplicates.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::Store;
use crate::error::{CoreError, Result};
use crate::model::{
    BillingCycle, Client, ClientStatus, Credential, CredentialStatus, CredentialType, Execution,
    Invoice, InvoiceStatus, InvoiceType, SupportTicket, TicketPriority, TicketStatus, Workflow,
    WorkflowStatus,
};

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new Postgres-backed store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ============================================================================
// Clients
// ============================================================================

/// Create a client. Fees must be non-negative.
#[allow(clippy::too_many_arguments)]
pub async fn create_client(
    pool: &PgPool,
    company_name: &str,
    contact_name: &str,
    email: &str,
    plan_tier: &str,
    setup_fee: Decimal,
    monthly_fee: Decimal,
    billing_cycle: BillingCycle,
    next_billing_date: NaiveDate,
) -> Result<Client> {
    if setup_fee < Decimal::ZERO {
        return Err(CoreError::Validation {
            field: "setup_fee",
            message: "must be non-negative".to_string(),
        });
    }
    if monthly_fee < Decimal::ZERO {
        return Err(CoreError::Validation {
            field: "monthly_fee",
            message: "must be non-negative".to_string(),
        });
    }

    let client = sqlx::query_as::<_, Client>(
        r#"
        INSERT INTO clients
            (id, company_name, contact_name, email, status, plan_tier,
             setup_fee, monthly_fee, billing_cycle, next_billing_date,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, 'active', $5, $6, $7, $8, $9, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(company_name)
    .bind(contact_name)
    .bind(email)
    .bind(plan_tier)
    .bind(setup_fee)
    .bind(monthly_fee)
    .bind(billing_cycle)
    .bind(next_billing_date)
    .fetch_one(pool)
    .await
    .map_err(|e| CoreError::from(e).for_entity("client"))?;

    Ok(client)
}

/// Get a client by ID.
pub async fn get_client(pool: &PgPool, client_id: Uuid) -> Result<Option<Client>> {
    let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = $1")
        .bind(client_id)
        .fetch_optional(pool)
        .await?;
    Ok(client)
}

/// List clients in the given status, oldest first.
pub async fn get_clients_by_status(pool: &PgPool, status: ClientStatus) -> Result<Vec<Client>> {
    let clients = sqlx::query_as::<_, Client>(
        "SELECT * FROM clients WHERE status = $1 ORDER BY created_at ASC",
    )
    .bind(status)
    .fetch_all(pool)
    .await?;
    Ok(clients)
}

/// Update a client's lifecycle status (administrative action).
pub async fn set_client_status(pool: &PgPool, client_id: Uuid, status: ClientStatus) -> Result<()> {
    let result =
        sqlx::query("UPDATE clients SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(client_id)
            .bind(status)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::NotFound {
            entity: "client",
            id: client_id.to_string(),
        });
    }
    Ok(())
}

/// Sum of monthly fees across active clients.
pub async fn monthly_recurring_revenue(pool: &PgPool) -> Result<Decimal> {
    let total = sqlx::query_scalar::<_, Decimal>(
        "SELECT COALESCE(SUM(monthly_fee), 0) FROM clients WHERE status = 'active'",
    )
    .fetch_one(pool)
    .await?;
    Ok(total)
}

// ============================================================================
// Workflows
// ============================================================================

/// Create a workflow for a client. The external ID must be unique.
pub async fn create_workflow(
    pool: &PgPool,
    client_id: Uuid,
    name: &str,
    external_id: &str,
) -> Result<Workflow> {
    let workflow = sqlx::query_as::<_, Workflow>(
        r#"
        INSERT INTO workflows
            (id, client_id, name, external_id, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, 'active', NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(client_id)
    .bind(name)
    .bind(external_id)
    .fetch_one(pool)
    .await
    .map_err(|e| CoreError::from(e).for_entity("workflow"))?;

    Ok(workflow)
}

/// Get a workflow by ID.
pub async fn get_workflow(pool: &PgPool, workflow_id: Uuid) -> Result<Option<Workflow>> {
    let workflow = sqlx::query_as::<_, Workflow>("SELECT * FROM workflows WHERE id = $1")
        .bind(workflow_id)
        .fetch_optional(pool)
        .await?;
    Ok(workflow)
}

/// Get a workflow by its engine-side external ID.
pub async fn get_workflow_by_external_id(
    pool: &PgPool,
    external_id: &str,
) -> Result<Option<Workflow>> {
    let workflow = sqlx::query_as::<_, Workflow>("SELECT * FROM workflows WHERE external_id = $1")
        .bind(external_id)
        .fetch_optional(pool)
        .await?;
    Ok(workflow)
}

/// List workflows in the given status, across all clients.
pub async fn get_workflows_by_status(
    pool: &PgPool,
    status: WorkflowStatus,
) -> Result<Vec<Workflow>> {
    let workflows = sqlx::query_as::<_, Workflow>(
        "SELECT * FROM workflows WHERE status = $1 ORDER BY created_at ASC",
    )
    .bind(status)
    .fetch_all(pool)
    .await?;
    Ok(workflows)
}

/// List every workflow belonging to a client.
pub async fn get_workflows_for_client(pool: &PgPool, client_id: Uuid) -> Result<Vec<Workflow>> {
    let workflows = sqlx::query_as::<_, Workflow>(
        "SELECT * FROM workflows WHERE client_id = $1 ORDER BY created_at ASC",
    )
    .bind(client_id)
    .fetch_all(pool)
    .await?;
    Ok(workflows)
}

/// Transition a workflow's status. Returns false when already in the target
/// status.
pub async fn set_workflow_status(
    pool: &PgPool,
    workflow_id: Uuid,
    status: WorkflowStatus,
) -> Result<bool> {
    let current = get_workflow(pool, workflow_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "workflow",
            id: workflow_id.to_string(),
        })?;

    if !current.status.can_transition(status) {
        // Only the no-op case today; kept as an explicit early-out so the
        // transition predicate stays the single gate.
        return Ok(false);
    }

    let result = sqlx::query(
        "UPDATE workflows SET status = $2, updated_at = NOW() WHERE id = $1 AND status = $3",
    )
    .bind(workflow_id)
    .bind(status)
    .bind(current.status)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Write the denormalized health fields maintained by the health monitor.
pub async fn update_workflow_health(
    pool: &PgPool,
    workflow_id: Uuid,
    success_rate: Option<f64>,
    last_execution_at: Option<NaiveDate>,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE workflows
        SET recent_success_rate = $2,
            last_execution_at = COALESCE($3, last_execution_at),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(workflow_id)
    .bind(success_rate)
    .bind(last_execution_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::NotFound {
            entity: "workflow",
            id: workflow_id.to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// Executions
// ============================================================================

/// Validate aggregate counts before they reach the database.
pub(crate) fn validate_counts(total: i32, success: i32, error: i32) -> Result<()> {
    if total < 0 || success < 0 || error < 0 {
        return Err(CoreError::Validation {
            field: "counts",
            message: "counts must be non-negative".to_string(),
        });
    }
    if success + error > total {
        return Err(CoreError::Validation {
            field: "counts",
            message: format!(
                "success ({}) + error ({}) exceeds total ({})",
                success, error, total
            ),
        });
    }
    Ok(())
}

/// Insert or replace the daily aggregate for (workflow, date).
///
/// Replaces, never accumulates: the engine is authoritative for a day's
/// totals, so re-running the same window converges to the same stored state.
pub async fn upsert_execution(
    pool: &PgPool,
    workflow_id: Uuid,
    client_id: Uuid,
    date: NaiveDate,
    total: i32,
    success: i32,
    error: i32,
) -> Result<()> {
    validate_counts(total, success, error)?;

    sqlx::query(
        r#"
        INSERT INTO executions
            (id, client_id, workflow_id, execution_date,
             total_count, success_count, error_count, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
        ON CONFLICT (workflow_id, execution_date) DO UPDATE SET
            total_count = EXCLUDED.total_count,
            success_count = EXCLUDED.success_count,
            error_count = EXCLUDED.error_count
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(client_id)
    .bind(workflow_id)
    .bind(date)
    .bind(total)
    .bind(success)
    .bind(error)
    .execute(pool)
    .await
    .map_err(|e| CoreError::from(e).for_entity("execution"))?;

    Ok(())
}

/// Fetch aggregates for a workflow within an inclusive date range.
pub async fn get_executions_in_range(
    pool: &PgPool,
    workflow_id: Uuid,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<Execution>> {
    let executions = sqlx::query_as::<_, Execution>(
        r#"
        SELECT * FROM executions
        WHERE workflow_id = $1 AND execution_date BETWEEN $2 AND $3
        ORDER BY execution_date ASC
        "#,
    )
    .bind(workflow_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;
    Ok(executions)
}

// ============================================================================
// Invoices
// ============================================================================

/// Create a pending invoice.
///
/// The invoice number comes from `invoice_number_seq` inside the insert
/// statement, so two concurrent creations can never observe the same
/// "previous max" — this is the one true critical section of the billing
/// engine.
pub async fn create_invoice(
    pool: &PgPool,
    client_id: Uuid,
    amount: Decimal,
    invoice_type: InvoiceType,
    due_date: NaiveDate,
) -> Result<Invoice> {
    if amount <= Decimal::ZERO {
        return Err(CoreError::Validation {
            field: "amount",
            message: "must be positive".to_string(),
        });
    }

    let invoice = sqlx::query_as::<_, Invoice>(
        r#"
        INSERT INTO invoices
            (id, client_id, invoice_number, amount, invoice_type, status,
             due_date, created_at, updated_at)
        VALUES ($1, $2, nextval('invoice_number_seq'), $3, $4, 'pending',
                $5, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(client_id)
    .bind(amount)
    .bind(invoice_type)
    .bind(due_date)
    .fetch_one(pool)
    .await
    .map_err(|e| CoreError::from(e).for_entity("invoice"))?;

    Ok(invoice)
}

/// Get an invoice by ID.
pub async fn get_invoice(pool: &PgPool, invoice_id: Uuid) -> Result<Option<Invoice>> {
    let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1")
        .bind(invoice_id)
        .fetch_optional(pool)
        .await?;
    Ok(invoice)
}

/// Transition an invoice's status through the state machine.
///
/// Illegal transitions fail with [`CoreError::InvariantViolation`]. The
/// update is optimistic (`WHERE status = current`), so losing a race with a
/// concurrent writer returns `Ok(false)` instead of clobbering their write.
pub async fn set_invoice_status(
    pool: &PgPool,
    invoice_id: Uuid,
    to: InvoiceStatus,
) -> Result<bool> {
    let current = get_invoice(pool, invoice_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "invoice",
            id: invoice_id.to_string(),
        })?;

    if current.status == to {
        return Ok(false);
    }
    if !current.status.can_transition(to) {
        return Err(CoreError::InvariantViolation {
            entity: "invoice",
            from: current.status.as_str().to_string(),
            to: to.as_str().to_string(),
        });
    }

    let result = sqlx::query(
        "UPDATE invoices SET status = $2, updated_at = NOW() WHERE id = $1 AND status = $3",
    )
    .bind(invoice_id)
    .bind(to)
    .bind(current.status)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Record payment of an invoice.
///
/// Paying an already-paid invoice is a logged no-op, not an error.
pub async fn mark_invoice_paid(
    pool: &PgPool,
    invoice_id: Uuid,
    paid_date: NaiveDate,
) -> Result<bool> {
    let current = get_invoice(pool, invoice_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "invoice",
            id: invoice_id.to_string(),
        })?;

    if current.status == InvoiceStatus::Paid {
        warn!(
            invoice_id = %invoice_id,
            invoice_number = %current.display_number(),
            "Ignoring payment of an already-paid invoice"
        );
        return Ok(false);
    }

    let result = sqlx::query(
        r#"
        UPDATE invoices
        SET status = 'paid', paid_date = $2, updated_at = NOW()
        WHERE id = $1 AND status <> 'paid'
        "#,
    )
    .bind(invoice_id)
    .bind(paid_date)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Pending invoices whose due date has passed as of `asof`.
pub async fn get_overdue_candidates(pool: &PgPool, asof: NaiveDate) -> Result<Vec<Invoice>> {
    let invoices = sqlx::query_as::<_, Invoice>(
        r#"
        SELECT * FROM invoices
        WHERE status = 'pending' AND due_date < $1
        ORDER BY due_date ASC
        "#,
    )
    .bind(asof)
    .fetch_all(pool)
    .await?;
    Ok(invoices)
}

/// Pending and overdue invoices inside the reminder horizon: due within the
/// next 3 days of `asof`, due today, or already past due.
pub async fn get_invoices_due_for_reminder(
    pool: &PgPool,
    asof: NaiveDate,
) -> Result<Vec<Invoice>> {
    let invoices = sqlx::query_as::<_, Invoice>(
        r#"
        SELECT * FROM invoices
        WHERE status IN ('pending', 'overdue')
          AND due_date <= $1 + 3
        ORDER BY due_date ASC, invoice_number ASC
        "#,
    )
    .bind(asof)
    .fetch_all(pool)
    .await?;
    Ok(invoices)
}

// ============================================================================
// Credentials
// ============================================================================

/// Store a sealed credential for a client. One credential per
/// (client, service); storing again replaces the ciphertext.
pub async fn upsert_credential(
    pool: &PgPool,
    client_id: Uuid,
    service_name: &str,
    credential_type: CredentialType,
    ciphertext: &str,
) -> Result<Credential> {
    let credential = sqlx::query_as::<_, Credential>(
        r#"
        INSERT INTO credentials
            (id, client_id, service_name, credential_type, ciphertext,
             status, created_at)
        VALUES ($1, $2, $3, $4, $5, 'active', NOW())
        ON CONFLICT (client_id, service_name) DO UPDATE SET
            credential_type = EXCLUDED.credential_type,
            ciphertext = EXCLUDED.ciphertext,
            status = 'active',
            last_verified = NULL
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(client_id)
    .bind(service_name)
    .bind(credential_type)
    .bind(ciphertext)
    .fetch_one(pool)
    .await
    .map_err(|e| CoreError::from(e).for_entity("credential"))?;

    Ok(credential)
}

/// Fetch a client's credential for a service.
pub async fn get_credential(
    pool: &PgPool,
    client_id: Uuid,
    service_name: &str,
) -> Result<Option<Credential>> {
    let credential = sqlx::query_as::<_, Credential>(
        "SELECT * FROM credentials WHERE client_id = $1 AND service_name = $2",
    )
    .bind(client_id)
    .bind(service_name)
    .fetch_optional(pool)
    .await?;
    Ok(credential)
}

/// Update a credential's verification status.
pub async fn set_credential_status(
    pool: &PgPool,
    credential_id: Uuid,
    status: CredentialStatus,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE credentials SET status = $2, last_verified = NOW() WHERE id = $1",
    )
    .bind(credential_id)
    .bind(status)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::NotFound {
            entity: "credential",
            id: credential_id.to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// Support Tickets
// ============================================================================

/// Open a ticket for a client.
pub async fn create_ticket(
    pool: &PgPool,
    client_id: Uuid,
    subject: &str,
    description: &str,
    priority: TicketPriority,
) -> Result<SupportTicket> {
    let ticket = sqlx::query_as::<_, SupportTicket>(
        r#"
        INSERT INTO support_tickets
            (id, client_id, subject, description, status, priority, created_at)
        VALUES ($1, $2, $3, $4, 'open', $5, NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(client_id)
    .bind(subject)
    .bind(description)
    .bind(priority)
    .fetch_one(pool)
    .await?;

    Ok(ticket)
}

/// Get a ticket by ID.
pub async fn get_ticket(pool: &PgPool, ticket_id: Uuid) -> Result<Option<SupportTicket>> {
    let ticket = sqlx::query_as::<_, SupportTicket>("SELECT * FROM support_tickets WHERE id = $1")
        .bind(ticket_id)
        .fetch_optional(pool)
        .await?;
    Ok(ticket)
}

/// Transition a ticket through its workflow. Resolution stamps `resolved_at`.
pub async fn set_ticket_status(
    pool: &PgPool,
    ticket_id: Uuid,
    status: TicketStatus,
) -> Result<bool> {
    let current = get_ticket(pool, ticket_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "ticket",
            id: ticket_id.to_string(),
        })?;

    if current.status == status {
        return Ok(false);
    }
    if !current.status.can_transition(status) {
        return Err(CoreError::InvariantViolation {
            entity: "ticket",
            from: format!("{:?}", current.status),
            to: format!("{:?}", status),
        });
    }

    let resolved_at: Option<DateTime<Utc>> = match status {
        TicketStatus::Resolved => Some(Utc::now()),
        _ => None,
    };

    let result = sqlx::query(
        "UPDATE support_tickets SET status = $2, resolved_at = $3 WHERE id = $1 AND status = $4",
    )
    .bind(ticket_id)
    .bind(status)
    .bind(resolved_at)
    .bind(current.status)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// List tickets in the given status, newest first.
pub async fn get_tickets_by_status(
    pool: &PgPool,
    status: TicketStatus,
) -> Result<Vec<SupportTicket>> {
    let tickets = sqlx::query_as::<_, SupportTicket>(
        "SELECT * FROM support_tickets WHERE status = $1 ORDER BY created_at DESC",
    )
    .bind(status)
    .fetch_all(pool)
    .await?;
    Ok(tickets)
}

// ============================================================================
// Store trait implementation
// ============================================================================

#[async_trait::async_trait]
impl Store for PostgresStore {
    async fn get_clients_by_status(
        &self,
        status: ClientStatus,
    ) -> Result<Vec<Client>> {
        get_clients_by_status(&self.pool, status).await
    }

    async fn get_workflows_by_status(
        &self,
        status: WorkflowStatus,
    ) -> Result<Vec<Workflow>> {
        get_workflows_by_status(&self.pool, status).await
    }

    async fn get_workflows_for_client(&self, client_id: Uuid) -> Result<Vec<Workflow>> {
        get_workflows_for_client(&self.pool, client_id).await
    }

    async fn set_workflow_status(
        &self,
        workflow_id: Uuid,
        status: WorkflowStatus,
    ) -> Result<bool> {
        set_workflow_status(&self.pool, workflow_id, status).await
    }

    async fn update_workflow_health(
        &self,
        workflow_id: Uuid,
        success_rate: Option<f64>,
        last_execution_at: Option<NaiveDate>,
    ) -> Result<()> {
        update_workflow_health(&self.pool, workflow_id, success_rate, last_execution_at).await
    }

    async fn upsert_execution(
        &self,
        workflow_id: Uuid,
        client_id: Uuid,
        date: NaiveDate,
        total: i32,
        success: i32,
        error: i32,
    ) -> Result<()> {
        upsert_execution(&self.pool, workflow_id, client_id, date, total, success, error).await
    }

    async fn get_executions_in_range(
        &self,
        workflow_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Execution>> {
        get_executions_in_range(&self.pool, workflow_id, from, to).await
    }

    async fn create_invoice(
        &self,
        client_id: Uuid,
        amount: Decimal,
        invoice_type: InvoiceType,
        due_date: NaiveDate,
    ) -> Result<Invoice> {
        create_invoice(&self.pool, client_id, amount, invoice_type, due_date).await
    }

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>> {
        get_invoice(&self.pool, invoice_id).await
    }

    async fn set_invoice_status(
        &self,
        invoice_id: Uuid,
        to: InvoiceStatus,
    ) -> Result<bool> {
        set_invoice_status(&self.pool, invoice_id, to).await
    }

    async fn mark_invoice_paid(
        &self,
        invoice_id: Uuid,
        paid_date: NaiveDate,
    ) -> Result<bool> {
        mark_invoice_paid(&self.pool, invoice_id, paid_date).await
    }

    async fn get_overdue_candidates(&self, asof: NaiveDate) -> Result<Vec<Invoice>> {
        get_overdue_candidates(&self.pool, asof).await
    }

    async fn get_invoices_due_for_reminder(&self, asof: NaiveDate) -> Result<Vec<Invoice>> {
        get_invoices_due_for_reminder(&self.pool, asof).await
    }

    async fn get_credential(
        &self,
        client_id: Uuid,
        service_name: &str,
    ) -> Result<Option<Credential>> {
        get_credential(&self.pool, client_id, service_name).await
    }

    async fn set_credential_status(
        &self,
        credential_id: Uuid,
        status: CredentialStatus,
    ) -> Result<()> {
        set_credential_status(&self.pool, credential_id, status).await
    }
}
