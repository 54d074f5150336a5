// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flowdesk Sync - Background Job Daemon
//!
//! Runs the three batch jobs on their schedules:
//! - execution reconciler (engine history -> daily aggregates)
//! - health monitor (success rates -> workflow status + alerts)
//! - invoice lifecycle (due dates -> status transitions + reminders)

use std::sync::Arc;
use tracing::{info, warn};

use flowdesk_core::crypto::CredentialCipher;
use flowdesk_core::events::{LogSink, NotificationSink};
use flowdesk_core::persistence::PostgresStore;
use flowdesk_sync::config::SyncConfig;
use flowdesk_sync::connector::CredentialConnector;
use flowdesk_sync::health::{HealthConfig, HealthMonitor};
use flowdesk_sync::invoicing::{InvoiceConfig, InvoiceLifecycle};
use flowdesk_sync::notify::WebhookSink;
use flowdesk_sync::reconciler::{ExecutionReconciler, ReconcilerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowdesk_sync=info,flowdesk_core=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config = SyncConfig::from_env()?;

    info!(
        engine_url = %config.engine.base_url,
        window_days = config.reconcile_window_days,
        success_threshold = config.success_threshold,
        "Starting Flowdesk Sync"
    );

    // Connect to database
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    info!("Connected to database");

    // Apply migrations
    flowdesk_core::migrations::run(&pool).await?;
    info!("Database schema verified");

    // Shared collaborators
    let store = Arc::new(PostgresStore::new(pool));
    let cipher = Arc::new(CredentialCipher::from_base64_key(&config.encryption_key)?);
    let sink: Arc<dyn NotificationSink> = match &config.alert_webhook_url {
        Some(url) => {
            info!(webhook = %url, "Alerts delivered via webhook");
            Arc::new(WebhookSink::new(url).map_err(|e| anyhow::anyhow!(e.to_string()))?)
        }
        None => {
            info!("No webhook configured; alerts are logged only");
            Arc::new(LogSink)
        }
    };
    let connector = Arc::new(CredentialConnector::new(
        store.clone(),
        cipher,
        config.engine.clone(),
        config.engine_service_name.clone(),
    ));

    // Build the three jobs
    let reconciler = ExecutionReconciler::new(
        store.clone(),
        connector,
        sink.clone(),
        ReconcilerConfig {
            window_days: config.reconcile_window_days,
            poll_interval: config.reconcile_interval,
        },
    )
    .with_single_flight(&config.database_url);

    let health_monitor = HealthMonitor::new(
        store.clone(),
        sink.clone(),
        HealthConfig {
            window_days: config.reconcile_window_days,
            success_threshold: config.success_threshold,
            emit_recovered: config.emit_recovered,
            poll_interval: config.health_interval,
        },
    )
    .with_single_flight(&config.database_url);

    let invoice_lifecycle = InvoiceLifecycle::new(
        store,
        sink,
        InvoiceConfig {
            poll_interval: config.invoice_interval,
        },
    )
    .with_single_flight(&config.database_url);

    let shutdown_handles = [
        reconciler.shutdown_handle(),
        health_monitor.shutdown_handle(),
        invoice_lifecycle.shutdown_handle(),
    ];

    let workers = [
        tokio::spawn(async move { reconciler.run().await }),
        tokio::spawn(async move { health_monitor.run().await }),
        tokio::spawn(async move { invoice_lifecycle.run().await }),
    ];

    info!("Flowdesk Sync ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Graceful shutdown
    for handle in &shutdown_handles {
        // notify_one stores a permit, so a worker between await points
        // still observes the shutdown.
        handle.notify_one();
    }
    for worker in workers {
        let _ = worker.await;
    }

    info!("Flowdesk Sync shut down");

    Ok(())
}
