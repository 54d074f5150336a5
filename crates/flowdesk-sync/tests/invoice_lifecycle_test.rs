// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the invoice lifecycle: monotonic status transitions, reminder
//! offsets, and the overdue notice cadence.

mod common;

use std::sync::Arc;

use chrono::NaiveDate;
use flowdesk_core::events::{Alert, MemorySink};
use flowdesk_core::model::{ClientStatus, InvoiceStatus, InvoiceType};
use flowdesk_core::persistence::Store;
use flowdesk_sync::invoicing::{InvoiceConfig, InvoiceLifecycle};
use rust_decimal::Decimal;
use uuid::Uuid;

use common::{MemoryStore, day, make_client};

struct Fixture {
    store: Arc<MemoryStore>,
    sink: Arc<MemorySink>,
    lifecycle: InvoiceLifecycle,
    client_id: Uuid,
}

fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let sink = Arc::new(MemorySink::new());
    let lifecycle = InvoiceLifecycle::new(store.clone(), sink.clone(), InvoiceConfig::default());
    let client = make_client(ClientStatus::Active);
    let client_id = client.id;
    store.add_client(client);
    Fixture {
        store,
        sink,
        lifecycle,
        client_id,
    }
}

async fn pending_invoice(f: &Fixture, due: NaiveDate) -> Uuid {
    f.store
        .create_invoice(
            f.client_id,
            Decimal::new(49900, 2),
            InvoiceType::Monthly,
            due,
        )
        .await
        .unwrap()
        .id
}

fn reminders(sink: &MemorySink, invoice_id: Uuid) -> Vec<i64> {
    sink.alerts()
        .into_iter()
        .filter_map(|a| match a {
            Alert::InvoiceReminder {
                invoice_id: id,
                days_until_due,
            } if id == invoice_id => Some(days_until_due),
            _ => None,
        })
        .collect()
}

fn overdue_notices(sink: &MemorySink, invoice_id: Uuid) -> usize {
    sink.alerts()
        .into_iter()
        .filter(|a| matches!(a, Alert::InvoiceOverdue { invoice_id: id } if *id == invoice_id))
        .count()
}

#[tokio::test]
async fn test_due_today_reminds_without_transition() {
    let f = fixture();
    let invoice_id = pending_invoice(&f, day(10)).await;

    let summary = f.lifecycle.run_once(day(10)).await.unwrap();

    // Due today is not past due: the invoice stays pending and gets exactly
    // one reminder with zero days until due.
    assert_eq!(summary.marked_overdue, 0);
    assert_eq!(summary.reminders_sent, 1);
    assert_eq!(f.store.invoice(invoice_id).status, InvoiceStatus::Pending);
    assert_eq!(reminders(&f.sink, invoice_id), vec![0]);
}

#[tokio::test]
async fn test_three_day_reminder_offset() {
    let f = fixture();
    let invoice_id = pending_invoice(&f, day(13)).await;

    f.lifecycle.run_once(day(10)).await.unwrap();
    assert_eq!(reminders(&f.sink, invoice_id), vec![3]);

    // Two days out is not an offset day: nothing new.
    f.lifecycle.run_once(day(11)).await.unwrap();
    assert_eq!(reminders(&f.sink, invoice_id), vec![3]);
}

#[tokio::test]
async fn test_past_due_transitions_to_overdue_once() {
    let f = fixture();
    let invoice_id = pending_invoice(&f, day(9)).await;

    let summary = f.lifecycle.run_once(day(10)).await.unwrap();

    assert_eq!(summary.marked_overdue, 1);
    assert_eq!(summary.overdue_notices, 1);
    assert_eq!(f.store.invoice(invoice_id).status, InvoiceStatus::Overdue);
    assert_eq!(overdue_notices(&f.sink, invoice_id), 1);
}

#[tokio::test]
async fn test_overdue_notice_cadence_is_weekly() {
    let f = fixture();
    let invoice_id = pending_invoice(&f, day(9)).await;

    // Day 1 past due: transition + notice.
    f.lifecycle.run_once(day(10)).await.unwrap();
    assert_eq!(overdue_notices(&f.sink, invoice_id), 1);

    // Days 2-7 past due: silent.
    for d in 11..=16 {
        f.lifecycle.run_once(day(d)).await.unwrap();
    }
    assert_eq!(overdue_notices(&f.sink, invoice_id), 1);

    // Day 8 past due: repeat notice.
    f.lifecycle.run_once(day(17)).await.unwrap();
    assert_eq!(overdue_notices(&f.sink, invoice_id), 2);

    // Day 15 past due: next repeat.
    f.lifecycle.run_once(day(24)).await.unwrap();
    assert_eq!(overdue_notices(&f.sink, invoice_id), 3);
}

#[tokio::test]
async fn test_overdue_to_paid_allowed_and_final() {
    let f = fixture();
    let invoice_id = pending_invoice(&f, day(9)).await;
    f.lifecycle.run_once(day(10)).await.unwrap();
    assert_eq!(f.store.invoice(invoice_id).status, InvoiceStatus::Overdue);

    assert!(f.lifecycle.mark_paid(invoice_id, day(12)).await.unwrap());
    let invoice = f.store.invoice(invoice_id);
    assert_eq!(invoice.status, InvoiceStatus::Paid);
    assert_eq!(invoice.paid_date, Some(day(12)));

    // Paying again is a no-op.
    assert!(!f.lifecycle.mark_paid(invoice_id, day(13)).await.unwrap());

    // And a later run never drags a paid invoice back.
    f.lifecycle.run_once(day(20)).await.unwrap();
    assert_eq!(f.store.invoice(invoice_id).status, InvoiceStatus::Paid);
    assert_eq!(overdue_notices(&f.sink, invoice_id), 1);
}

#[tokio::test]
async fn test_paid_before_due_never_reminded() {
    let f = fixture();
    let invoice_id = pending_invoice(&f, day(12)).await;
    f.lifecycle.mark_paid(invoice_id, day(8)).await.unwrap();

    for d in 9..=13 {
        f.lifecycle.run_once(day(d)).await.unwrap();
    }

    assert!(reminders(&f.sink, invoice_id).is_empty());
    assert_eq!(overdue_notices(&f.sink, invoice_id), 0);
    assert_eq!(f.store.invoice(invoice_id).status, InvoiceStatus::Paid);
}

#[tokio::test]
async fn test_invoice_numbers_assigned_sequentially() {
    let f = fixture();
    let mut numbers = Vec::new();
    for _ in 0..5 {
        let invoice = f
            .lifecycle
            .create_invoice(
                f.client_id,
                Decimal::new(10000, 2),
                InvoiceType::Additional,
                day(20),
            )
            .await
            .unwrap();
        numbers.push(invoice.invoice_number);
    }

    for pair in numbers.windows(2) {
        assert_eq!(pair[1], pair[0] + 1, "numbers increase without gaps");
    }
}

#[tokio::test]
async fn test_create_invoice_rejects_non_positive_amount() {
    let f = fixture();
    let result = f
        .lifecycle
        .create_invoice(f.client_id, Decimal::ZERO, InvoiceType::Monthly, day(20))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_far_future_invoice_ignored() {
    let f = fixture();
    let invoice_id = pending_invoice(&f, day(30)).await;

    let summary = f.lifecycle.run_once(day(10)).await.unwrap();

    assert_eq!(summary.examined, 0);
    assert_eq!(f.store.invoice(invoice_id).status, InvoiceStatus::Pending);
    assert!(f.sink.is_empty());
}
