// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for flowdesk-sync job tests.
//!
//! Provides an in-memory [`Store`] implementation plus engine fakes, so the
//! jobs run end to end without Postgres or an automation engine.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use flowdesk_core::error::CoreError;
use flowdesk_core::model::{
    BillingCycle, Client, ClientStatus, Credential, CredentialStatus, CredentialType, Execution,
    Invoice, InvoiceStatus, InvoiceType, Workflow, WorkflowStatus,
};
use flowdesk_core::persistence::Store;
use flowdesk_engine_sdk::{
    EngineApi, EngineError, EngineWorkflowStatus, ExecutionRecord, WorkflowMeta,
};
use flowdesk_sync::connector::EngineConnector;

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
}

pub fn make_client(status: ClientStatus) -> Client {
    let id = Uuid::new_v4();
    Client {
        id,
        company_name: format!("Client {}", id),
        contact_name: "Contact".to_string(),
        email: format!("{}@example.com", id),
        status,
        plan_tier: "Business Process".to_string(),
        setup_fee: Decimal::ZERO,
        monthly_fee: Decimal::new(49900, 2),
        billing_cycle: BillingCycle::Monthly,
        next_billing_date: day(1),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn make_workflow(client_id: Uuid, status: WorkflowStatus) -> Workflow {
    let id = Uuid::new_v4();
    Workflow {
        id,
        client_id,
        name: format!("Workflow {}", id),
        external_id: format!("wf-{}", id),
        status,
        last_execution_at: None,
        recent_success_rate: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory store mirroring the Postgres semantics the jobs rely on:
/// replace-style execution upserts, FSM-checked status transitions, and
/// monotonically increasing invoice numbers.
#[derive(Default)]
pub struct MemoryStore {
    pub clients: Mutex<Vec<Client>>,
    pub workflows: Mutex<Vec<Workflow>>,
    pub executions: Mutex<Vec<Execution>>,
    pub invoices: Mutex<Vec<Invoice>>,
    pub credentials: Mutex<Vec<Credential>>,
    next_invoice_number: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_invoice_number: AtomicI64::new(1),
            ..Self::default()
        })
    }

    pub fn add_client(&self, client: Client) {
        self.clients.lock().unwrap().push(client);
    }

    pub fn add_workflow(&self, workflow: Workflow) {
        self.workflows.lock().unwrap().push(workflow);
    }

    pub fn add_credential(&self, client_id: Uuid, service_name: &str, ciphertext: &str) {
        self.credentials.lock().unwrap().push(Credential {
            id: Uuid::new_v4(),
            client_id,
            service_name: service_name.to_string(),
            credential_type: CredentialType::ApiKey,
            ciphertext: ciphertext.to_string(),
            status: CredentialStatus::Active,
            last_verified: None,
            created_at: Utc::now(),
        });
    }

    pub fn workflow(&self, workflow_id: Uuid) -> Workflow {
        self.workflows
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.id == workflow_id)
            .expect("workflow not in store")
            .clone()
    }

    pub fn invoice(&self, invoice_id: Uuid) -> Invoice {
        self.invoices
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.id == invoice_id)
            .expect("invoice not in store")
            .clone()
    }

    pub fn executions_for(&self, workflow_id: Uuid) -> Vec<Execution> {
        let mut rows: Vec<Execution> = self
            .executions
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.execution_date);
        rows
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_clients_by_status(
        &self,
        status: ClientStatus,
    ) -> Result<Vec<Client>, CoreError> {
        Ok(self
            .clients
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.status == status)
            .cloned()
            .collect())
    }

    async fn get_workflows_by_status(
        &self,
        status: WorkflowStatus,
    ) -> Result<Vec<Workflow>, CoreError> {
        Ok(self
            .workflows
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.status == status)
            .cloned()
            .collect())
    }

    async fn get_workflows_for_client(
        &self,
        client_id: Uuid,
    ) -> Result<Vec<Workflow>, CoreError> {
        Ok(self
            .workflows
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn set_workflow_status(
        &self,
        workflow_id: Uuid,
        status: WorkflowStatus,
    ) -> Result<bool, CoreError> {
        let mut workflows = self.workflows.lock().unwrap();
        let workflow = workflows
            .iter_mut()
            .find(|w| w.id == workflow_id)
            .ok_or(CoreError::NotFound {
                entity: "workflow",
                id: workflow_id.to_string(),
            })?;
        if !workflow.status.can_transition(status) {
            return Ok(false);
        }
        workflow.status = status;
        Ok(true)
    }

    async fn update_workflow_health(
        &self,
        workflow_id: Uuid,
        success_rate: Option<f64>,
        last_execution_at: Option<NaiveDate>,
    ) -> Result<(), CoreError> {
        let mut workflows = self.workflows.lock().unwrap();
        let workflow = workflows
            .iter_mut()
            .find(|w| w.id == workflow_id)
            .ok_or(CoreError::NotFound {
                entity: "workflow",
                id: workflow_id.to_string(),
            })?;
        workflow.recent_success_rate = success_rate;
        if last_execution_at.is_some() {
            workflow.last_execution_at = last_execution_at;
        }
        Ok(())
    }

    async fn upsert_execution(
        &self,
        workflow_id: Uuid,
        client_id: Uuid,
        date: NaiveDate,
        total: i32,
        success: i32,
        error: i32,
    ) -> Result<(), CoreError> {
        if total < 0 || success < 0 || error < 0 || success + error > total {
            return Err(CoreError::Validation {
                field: "counts",
                message: "invalid aggregate counts".to_string(),
            });
        }
        let mut executions = self.executions.lock().unwrap();
        match executions
            .iter_mut()
            .find(|e| e.workflow_id == workflow_id && e.execution_date == date)
        {
            Some(row) => {
                row.total_count = total;
                row.success_count = success;
                row.error_count = error;
            }
            None => executions.push(Execution {
                id: Uuid::new_v4(),
                client_id,
                workflow_id,
                execution_date: date,
                total_count: total,
                success_count: success,
                error_count: error,
                created_at: Utc::now(),
            }),
        }
        Ok(())
    }

    async fn get_executions_in_range(
        &self,
        workflow_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Execution>, CoreError> {
        let mut rows: Vec<Execution> = self
            .executions
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                e.workflow_id == workflow_id && e.execution_date >= from && e.execution_date <= to
            })
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.execution_date);
        Ok(rows)
    }

    async fn create_invoice(
        &self,
        client_id: Uuid,
        amount: Decimal,
        invoice_type: InvoiceType,
        due_date: NaiveDate,
    ) -> Result<Invoice, CoreError> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::Validation {
                field: "amount",
                message: "must be positive".to_string(),
            });
        }
        let invoice = Invoice {
            id: Uuid::new_v4(),
            client_id,
            invoice_number: self.next_invoice_number.fetch_add(1, Ordering::SeqCst),
            amount,
            invoice_type,
            status: InvoiceStatus::Pending,
            due_date,
            paid_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.invoices.lock().unwrap().push(invoice.clone());
        Ok(invoice)
    }

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, CoreError> {
        Ok(self
            .invoices
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.id == invoice_id)
            .cloned())
    }

    async fn set_invoice_status(
        &self,
        invoice_id: Uuid,
        to: InvoiceStatus,
    ) -> Result<bool, CoreError> {
        let mut invoices = self.invoices.lock().unwrap();
        let invoice = invoices
            .iter_mut()
            .find(|i| i.id == invoice_id)
            .ok_or(CoreError::NotFound {
                entity: "invoice",
                id: invoice_id.to_string(),
            })?;
        if invoice.status == to {
            return Ok(false);
        }
        if !invoice.status.can_transition(to) {
            return Err(CoreError::InvariantViolation {
                entity: "invoice",
                from: invoice.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        invoice.status = to;
        Ok(true)
    }

    async fn mark_invoice_paid(
        &self,
        invoice_id: Uuid,
        paid_date: NaiveDate,
    ) -> Result<bool, CoreError> {
        let mut invoices = self.invoices.lock().unwrap();
        let invoice = invoices
            .iter_mut()
            .find(|i| i.id == invoice_id)
            .ok_or(CoreError::NotFound {
                entity: "invoice",
                id: invoice_id.to_string(),
            })?;
        if invoice.status == InvoiceStatus::Paid {
            return Ok(false);
        }
        invoice.status = InvoiceStatus::Paid;
        invoice.paid_date = Some(paid_date);
        Ok(true)
    }

    async fn get_overdue_candidates(&self, asof: NaiveDate) -> Result<Vec<Invoice>, CoreError> {
        Ok(self
            .invoices
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.status == InvoiceStatus::Pending && i.due_date < asof)
            .cloned()
            .collect())
    }

    async fn get_invoices_due_for_reminder(
        &self,
        asof: NaiveDate,
    ) -> Result<Vec<Invoice>, CoreError> {
        let horizon = asof + chrono::Days::new(3);
        Ok(self
            .invoices
            .lock()
            .unwrap()
            .iter()
            .filter(|i| {
                matches!(i.status, InvoiceStatus::Pending | InvoiceStatus::Overdue)
                    && i.due_date <= horizon
            })
            .cloned()
            .collect())
    }

    async fn get_credential(
        &self,
        client_id: Uuid,
        service_name: &str,
    ) -> Result<Option<Credential>, CoreError> {
        Ok(self
            .credentials
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.client_id == client_id && c.service_name == service_name)
            .cloned())
    }

    async fn set_credential_status(
        &self,
        credential_id: Uuid,
        status: CredentialStatus,
    ) -> Result<(), CoreError> {
        let mut credentials = self.credentials.lock().unwrap();
        let credential = credentials
            .iter_mut()
            .find(|c| c.id == credential_id)
            .ok_or(CoreError::NotFound {
                entity: "credential",
                id: credential_id.to_string(),
            })?;
        credential.status = status;
        credential.last_verified = Some(Utc::now());
        Ok(())
    }
}

// ============================================================================
// MockEngine + MockConnector
// ============================================================================

/// Failure a mock engine call should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineFailure {
    NotFound,
    Auth,
    RateLimited,
    Unreachable,
}

impl EngineFailure {
    fn to_error(self, external_id: &str) -> EngineError {
        match self {
            Self::NotFound => EngineError::NotFound(external_id.to_string()),
            Self::Auth => EngineError::Auth,
            Self::RateLimited => EngineError::RateLimited,
            Self::Unreachable => EngineError::Unreachable("connection refused".to_string()),
        }
    }
}

/// Scriptable in-memory automation engine.
#[derive(Default)]
pub struct MockEngine {
    executions: Mutex<HashMap<String, Vec<ExecutionRecord>>>,
    failures: Mutex<HashMap<String, EngineFailure>>,
    pub activations: Mutex<Vec<(String, bool)>>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Set the execution history the engine reports for a workflow.
    pub fn set_executions(&self, external_id: &str, records: Vec<ExecutionRecord>) {
        self.executions
            .lock()
            .unwrap()
            .insert(external_id.to_string(), records);
    }

    /// Make calls for a workflow fail.
    pub fn fail_with(&self, external_id: &str, failure: EngineFailure) {
        self.failures
            .lock()
            .unwrap()
            .insert(external_id.to_string(), failure);
    }
}

#[async_trait]
impl EngineApi for MockEngine {
    async fn get_workflow(&self, external_id: &str) -> Result<WorkflowMeta, EngineError> {
        if let Some(failure) = self.failures.lock().unwrap().get(external_id) {
            return Err(failure.to_error(external_id));
        }
        Ok(WorkflowMeta {
            id: external_id.to_string(),
            status: EngineWorkflowStatus::Active,
            last_active_at: None,
        })
    }

    async fn list_executions(
        &self,
        external_id: &str,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<ExecutionRecord>, EngineError> {
        if let Some(failure) = self.failures.lock().unwrap().get(external_id) {
            return Err(failure.to_error(external_id));
        }
        Ok(self
            .executions
            .lock()
            .unwrap()
            .get(external_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.date >= since && r.date <= until)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_active(&self, external_id: &str, active: bool) -> Result<(), EngineError> {
        if let Some(failure) = self.failures.lock().unwrap().get(external_id) {
            return Err(failure.to_error(external_id));
        }
        self.activations
            .lock()
            .unwrap()
            .push((external_id.to_string(), active));
        Ok(())
    }
}

/// Connector handing every client the same mock engine, except clients
/// scripted to fail credential resolution.
pub struct MockConnector {
    pub engine: Arc<MockEngine>,
    failing_clients: Mutex<HashSet<Uuid>>,
}

impl MockConnector {
    pub fn new(engine: Arc<MockEngine>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            failing_clients: Mutex::new(HashSet::new()),
        })
    }

    /// Make credential resolution fail for a client.
    pub fn fail_credentials_for(&self, client_id: Uuid) {
        self.failing_clients.lock().unwrap().insert(client_id);
    }
}

#[async_trait]
impl EngineConnector for MockConnector {
    async fn for_client(&self, client: &Client) -> Result<Arc<dyn EngineApi>, EngineError> {
        if self.failing_clients.lock().unwrap().contains(&client.id) {
            return Err(EngineError::Credential(format!(
                "client {} has no stored credential",
                client.id
            )));
        }
        Ok(self.engine.clone())
    }
}
