// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Contract tests for EngineClient against a mock engine.

use chrono::NaiveDate;
use flowdesk_engine_sdk::{
    EngineApi, EngineClient, EngineConfig, EngineError, EngineWorkflowStatus, StaticToken,
};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> EngineClient {
    EngineClient::new(
        EngineConfig::new(format!("{}/api/v1", server.uri())),
        Box::new(StaticToken::new("test-token")),
    )
    .unwrap()
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn test_get_workflow_sends_bearer_and_parses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/workflows/wf-1"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "wf-1",
            "status": "active",
            "lastActiveAt": "2025-03-01T08:30:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let meta = client_for(&server).get_workflow("wf-1").await.unwrap();
    assert_eq!(meta.id, "wf-1");
    assert_eq!(meta.status, EngineWorkflowStatus::Active);
}

#[tokio::test]
async fn test_get_workflow_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/workflows/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client_for(&server).get_workflow("gone").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(id) if id == "gone"));
}

#[tokio::test]
async fn test_auth_rejection_maps_to_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/workflows/wf-1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client_for(&server).get_workflow("wf-1").await.unwrap_err();
    assert!(matches!(err, EngineError::Auth));
    assert!(err.is_auth());
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_rate_limit_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/workflows/wf-1/executions"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .list_executions("wf-1", day(2025, 3, 1), day(2025, 3, 7))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RateLimited));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_server_error_maps_to_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/workflows/wf-1"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client_for(&server).get_workflow("wf-1").await.unwrap_err();
    assert!(matches!(err, EngineError::Unreachable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_list_executions_passes_range_and_collects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/workflows/wf-1/executions"))
        .and(query_param("since", "2025-03-01"))
        .and(query_param("until", "2025-03-07"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {"date": "2025-03-01", "succeeded": true},
                {"date": "2025-03-01", "succeeded": false},
                {"date": "2025-03-02", "succeeded": true}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let executions = client_for(&server)
        .list_executions("wf-1", day(2025, 3, 1), day(2025, 3, 7))
        .await
        .unwrap();
    assert_eq!(executions.len(), 3);
    assert!(executions[0].succeeded);
    assert!(!executions[1].succeeded);
}

#[tokio::test]
async fn test_list_executions_follows_cursor() {
    let server = MockServer::start().await;
    // First page hands back a cursor…
    Mock::given(method("GET"))
        .and(path("/api/v1/workflows/wf-1/executions"))
        .and(query_param("cursor", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"date": "2025-03-03", "succeeded": true}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    // …which the client follows until it is absent.
    Mock::given(method("GET"))
        .and(path("/api/v1/workflows/wf-1/executions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"date": "2025-03-02", "succeeded": true}],
            "nextCursor": "page2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let executions = client_for(&server)
        .list_executions("wf-1", day(2025, 3, 1), day(2025, 3, 7))
        .await
        .unwrap();
    assert_eq!(executions.len(), 2);
    assert_eq!(executions[0].date, day(2025, 3, 2));
    assert_eq!(executions[1].date, day(2025, 3, 3));
}

#[tokio::test]
async fn test_set_active_posts_activation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/workflows/wf-1/activate"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/workflows/wf-1/deactivate"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.set_active("wf-1", true).await.unwrap();
    client.set_active("wf-1", false).await.unwrap();
}
