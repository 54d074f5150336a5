// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flowdesk Control CLI
//!
//! One-shot invocation of the flowdesk batch jobs, intended for cron and for
//! operators. Each job run prints a structured summary; the exit code is
//! non-zero only when a whole run fails.
//!
//! Usage:
//!   flowdesk-ctl <command> [options]
//!
//! Commands:
//!   reconcile [--window <days>] [--as-of <date>]
//!   check-health [--threshold <rate>] [--as-of <date>]
//!   process-invoices [--as-of <date>]
//!   create-invoice --client <uuid> --amount <amount> --type <type> --due <date>
//!   activate --workflow <external-id> / deactivate --workflow <external-id>
//!   revenue

use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use flowdesk_core::crypto::CredentialCipher;
use flowdesk_core::events::{LogSink, NotificationSink};
use flowdesk_core::model::{InvoiceType, WorkflowStatus};
use flowdesk_core::persistence::{PostgresStore, postgres};
use flowdesk_engine_sdk::EngineApi;
use flowdesk_sync::config::SyncConfig;
use flowdesk_sync::connector::{CredentialConnector, EngineConnector};
use flowdesk_sync::health::{HealthConfig, HealthMonitor};
use flowdesk_sync::invoicing::{InvoiceConfig, InvoiceLifecycle};
use flowdesk_sync::lock::JobLock;
use flowdesk_sync::notify::WebhookSink;
use flowdesk_sync::reconciler::{ExecutionReconciler, ReconcilerConfig};

fn print_usage() {
    eprintln!(
        r#"Usage: flowdesk-ctl <command> [options]

Run flowdesk batch jobs once and print a summary.

COMMANDS:
    reconcile                       Merge engine execution history into daily aggregates
    check-health                    Evaluate workflow success rates and activity
    process-invoices                Advance invoice status and emit reminders
    create-invoice                  Create a pending invoice
    activate                        Activate a workflow on the engine and locally
    deactivate                      Deactivate a workflow on the engine and pause it locally
    revenue                         Print monthly recurring revenue of active clients

RECONCILE OPTIONS:
    --window <days>                 Trailing window in days (default: from env / 7)
    --as-of <date>                  Evaluation date, YYYY-MM-DD (default: today)

CHECK-HEALTH OPTIONS:
    --threshold <rate>              Success-rate threshold 0.0-1.0 (default: from env / 0.8)
    --as-of <date>                  Evaluation date, YYYY-MM-DD (default: today)

PROCESS-INVOICES OPTIONS:
    --as-of <date>                  Evaluation date, YYYY-MM-DD (default: today)

CREATE-INVOICE OPTIONS:
    --client <uuid>                 Client ID (required)
    --amount <amount>               Invoice amount, e.g. 499.00 (required)
    --type <type>                   setup | monthly | additional (required)
    --due <date>                    Due date, YYYY-MM-DD (required)

ACTIVATE/DEACTIVATE OPTIONS:
    --workflow <external-id>        Engine-side workflow ID (required)

ENVIRONMENT:
    FLOWDESK_DATABASE_URL           Postgres URL (required)
    FLOWDESK_ENCRYPTION_KEY         Base64 32-byte credential key (required)
    FLOWDESK_ENGINE_URL             Automation engine API base URL (required)
    FLOWDESK_ALERT_WEBHOOK_URL      Webhook for alerts (optional; logged otherwise)

EXAMPLES:
    # Nightly billing run
    flowdesk-ctl process-invoices

    # Re-reconcile the last 30 days after an engine outage
    flowdesk-ctl reconcile --window 30

    # Bill a client's setup fee
    flowdesk-ctl create-invoice --client 6b9f… --amount 1500.00 --type setup --due 2025-05-01
"#
    );
}

#[derive(Debug)]
enum Command {
    Reconcile {
        window: Option<u32>,
        asof: NaiveDate,
    },
    CheckHealth {
        threshold: Option<f64>,
        asof: NaiveDate,
    },
    ProcessInvoices {
        asof: NaiveDate,
    },
    CreateInvoice {
        client_id: Uuid,
        amount: Decimal,
        invoice_type: InvoiceType,
        due_date: NaiveDate,
    },
    SetActive {
        external_id: String,
        active: bool,
    },
    Revenue,
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let command = args.first().map(String::as_str).ok_or("missing command")?;
    let today = Utc::now().date_naive();

    let mut window: Option<u32> = None;
    let mut threshold: Option<f64> = None;
    let mut asof = today;
    let mut client_id: Option<Uuid> = None;
    let mut amount: Option<Decimal> = None;
    let mut invoice_type: Option<InvoiceType> = None;
    let mut due_date: Option<NaiveDate> = None;
    let mut external_id: Option<String> = None;

    let mut iter = args[1..].iter();
    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .ok_or_else(|| format!("{} requires a value", flag))?;
        match flag.as_str() {
            "--window" => window = Some(parse(value, "--window")?),
            "--threshold" => threshold = Some(parse(value, "--threshold")?),
            "--as-of" => asof = parse(value, "--as-of")?,
            "--client" => client_id = Some(parse(value, "--client")?),
            "--amount" => amount = Some(parse(value, "--amount")?),
            "--type" => {
                invoice_type = Some(match value.as_str() {
                    "setup" => InvoiceType::Setup,
                    "monthly" => InvoiceType::Monthly,
                    "additional" => InvoiceType::Additional,
                    other => return Err(format!("unknown invoice type: {}", other)),
                })
            }
            "--due" => due_date = Some(parse(value, "--due")?),
            "--workflow" => external_id = Some(value.clone()),
            other => return Err(format!("unknown option: {}", other)),
        }
    }

    match command {
        "reconcile" => Ok(Command::Reconcile { window, asof }),
        "check-health" => Ok(Command::CheckHealth { threshold, asof }),
        "process-invoices" => Ok(Command::ProcessInvoices { asof }),
        "create-invoice" => Ok(Command::CreateInvoice {
            client_id: client_id.ok_or("--client is required")?,
            amount: amount.ok_or("--amount is required")?,
            invoice_type: invoice_type.ok_or("--type is required")?,
            due_date: due_date.ok_or("--due is required")?,
        }),
        "activate" => Ok(Command::SetActive {
            external_id: external_id.ok_or("--workflow is required")?,
            active: true,
        }),
        "deactivate" => Ok(Command::SetActive {
            external_id: external_id.ok_or("--workflow is required")?,
            active: false,
        }),
        "revenue" => Ok(Command::Revenue),
        other => Err(format!("unknown command: {}", other)),
    }
}

fn parse<T: FromStr>(value: &str, flag: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| format!("invalid {} value '{}': {}", flag, value, e))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowdesk_sync=info,flowdesk_core=info".into()),
        )
        .init();

    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match run(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    let config = SyncConfig::from_env()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .connect(&config.database_url)
        .await?;
    flowdesk_core::migrations::run(&pool).await?;

    let store = Arc::new(PostgresStore::new(pool.clone()));
    let sink: Arc<dyn NotificationSink> = match &config.alert_webhook_url {
        Some(url) => Arc::new(WebhookSink::new(url).map_err(|e| anyhow::anyhow!(e.to_string()))?),
        None => Arc::new(LogSink),
    };

    match command {
        Command::Reconcile { window, asof } => {
            let cipher = Arc::new(CredentialCipher::from_base64_key(&config.encryption_key)?);
            let connector = Arc::new(CredentialConnector::new(
                store.clone(),
                cipher,
                config.engine.clone(),
                config.engine_service_name.clone(),
            ));
            let reconciler = ExecutionReconciler::new(
                store,
                connector,
                sink,
                ReconcilerConfig {
                    window_days: window.unwrap_or(config.reconcile_window_days),
                    ..ReconcilerConfig::default()
                },
            );

            let Some(guard) = JobLock::try_acquire(&config.database_url, "reconcile").await?
            else {
                eprintln!("A reconcile run is already in progress; nothing to do.");
                return Ok(());
            };
            let result = reconciler.run_once(asof).await;
            guard.release().await;
            let summary = result?;

            println!("Reconciliation as of {}:", asof);
            println!("  clients:     {}", summary.clients);
            println!("  reconciled:  {}", summary.workflows_reconciled);
            println!("  days merged: {}", summary.days_upserted);
            println!("  skipped:     {}", summary.skipped.len());
            for skip in &summary.skipped {
                println!("    {} ({})", skip.workflow_id, skip.reason);
            }
        }

        Command::CheckHealth { threshold, asof } => {
            let monitor = HealthMonitor::new(
                store,
                sink,
                HealthConfig {
                    window_days: config.reconcile_window_days,
                    success_threshold: threshold.unwrap_or(config.success_threshold),
                    emit_recovered: config.emit_recovered,
                    ..HealthConfig::default()
                },
            );

            let Some(guard) = JobLock::try_acquire(&config.database_url, "check-health").await?
            else {
                eprintln!("A health check is already in progress; nothing to do.");
                return Ok(());
            };
            let result = monitor.run_once(asof).await;
            guard.release().await;
            let summary = result?;

            println!("Health check as of {}:", asof);
            println!("  checked:   {}", summary.checked);
            println!("  degraded:  {}", summary.degraded);
            println!("  recovered: {}", summary.recovered);
            println!("  inactive:  {}", summary.inactive);
        }

        Command::ProcessInvoices { asof } => {
            let lifecycle = InvoiceLifecycle::new(store, sink, InvoiceConfig::default());

            let Some(guard) =
                JobLock::try_acquire(&config.database_url, "process-invoices").await?
            else {
                eprintln!("An invoice run is already in progress; nothing to do.");
                return Ok(());
            };
            let result = lifecycle.run_once(asof).await;
            guard.release().await;
            let summary = result?;

            println!("Invoice processing as of {}:", asof);
            println!("  examined:        {}", summary.examined);
            println!("  marked overdue:  {}", summary.marked_overdue);
            println!("  reminders:       {}", summary.reminders_sent);
            println!("  overdue notices: {}", summary.overdue_notices);
        }

        Command::CreateInvoice {
            client_id,
            amount,
            invoice_type,
            due_date,
        } => {
            let lifecycle = InvoiceLifecycle::new(store, sink, InvoiceConfig::default());
            let invoice = lifecycle
                .create_invoice(client_id, amount, invoice_type, due_date)
                .await?;
            println!(
                "Created {} for client {} ({} due {})",
                invoice.display_number(),
                client_id,
                invoice.amount,
                invoice.due_date
            );
        }

        Command::SetActive {
            external_id,
            active,
        } => {
            let workflow = postgres::get_workflow_by_external_id(&pool, &external_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no workflow with external id {}", external_id))?;
            let client = postgres::get_client(&pool, workflow.client_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("client {} not found", workflow.client_id))?;

            let cipher = Arc::new(CredentialCipher::from_base64_key(&config.encryption_key)?);
            let connector = CredentialConnector::new(
                store.clone(),
                cipher,
                config.engine.clone(),
                config.engine_service_name.clone(),
            );
            let engine = connector.for_client(&client).await?;
            engine.set_active(&external_id, active).await?;

            // Mirror the engine state locally: deactivation parks the
            // workflow as paused so the monitor stops evaluating it.
            let local_status = if active {
                WorkflowStatus::Active
            } else {
                WorkflowStatus::Paused
            };
            postgres::set_workflow_status(&pool, workflow.id, local_status).await?;

            println!(
                "Workflow {} {} on engine and set {} locally",
                external_id,
                if active { "activated" } else { "deactivated" },
                local_status.as_str()
            );
        }

        Command::Revenue => {
            let mrr = postgres::monthly_recurring_revenue(&pool).await?;
            println!("Monthly recurring revenue (active clients): {}", mrr);
        }
    }

    Ok(())
}
