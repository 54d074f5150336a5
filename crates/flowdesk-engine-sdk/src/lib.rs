// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flowdesk Engine SDK - Automation Engine API Client
//!
//! Typed wrapper for the external automation engine's REST API. The engine is
//! the source of truth for execution counts and workflow activation state;
//! this crate exposes exactly the three calls the reconciliation jobs need:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | `get_workflow` | `GET /workflows/{id}` |
//! | `list_executions` | `GET /workflows/{id}/executions?since=&until=` |
//! | `set_active` | `POST /workflows/{id}/activate` / `/deactivate` |
//!
//! All calls carry bounded timeouts and are authenticated with a bearer
//! credential resolved through a [`TokenProvider`] at call time — never
//! cached. Errors map onto a small typed set ([`EngineError`]) in which
//! `Unreachable` and `RateLimited` are retryable on a later run while
//! `NotFound` and `Auth` are not.

pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use client::{EngineApi, EngineClient, StaticToken, TokenProvider};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use types::{EngineWorkflowStatus, ExecutionRecord, ExecutionsPage, WorkflowMeta};
