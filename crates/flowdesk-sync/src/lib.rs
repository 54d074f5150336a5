// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flowdesk Sync - Reconciliation, Health, and Invoicing Jobs
//!
//! Three independent, idempotent batch jobs keep the flowdesk store aligned
//! with the external automation engine and drive billing:
//!
//! | Job | Writes | Cadence |
//! |-----|--------|---------|
//! | [`ExecutionReconciler`] | execution aggregates | every 15 min |
//! | [`HealthMonitor`] | workflow status + health fields | hourly |
//! | [`InvoiceLifecycle`] | invoice status | daily |
//!
//! The jobs touch disjoint write-sets and are safe to run concurrently with
//! each other; each one is prevented from overlapping *itself* by an
//! advisory-lock single-flight guard scoped to its job name. Every job can
//! also be invoked once via `run_once` (see the `flowdesk-ctl` binary),
//! returning a structured summary of what was processed, skipped, and why.
//!
//! No job ever takes the process down: per-item failures are logged,
//! aggregated into the summary, and retried naturally on the next scheduled
//! run.

pub mod config;
pub mod connector;
pub mod error;
pub mod health;
pub mod invoicing;
pub mod lock;
pub mod notify;
pub mod reconciler;

pub use config::SyncConfig;
pub use connector::{CredentialConnector, EngineConnector};
pub use error::SyncError;
pub use health::{HealthConfig, HealthMonitor, HealthSummary};
pub use invoicing::{InvoiceConfig, InvoiceLifecycle, InvoiceSummary};
pub use notify::WebhookSink;
pub use reconciler::{
    ExecutionReconciler, ReconcileSummary, ReconcilerConfig, SkipReason, SkippedWorkflow,
};
