mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use common::mocks::{claims_response, comparisons_json, plan_json, MockSearchProvider};
use common::{orchestrator_with, test_config};
use quest::api::handlers::health::HealthResponse;
use quest::api::handlers::sessions::ListSessionsResponse;
use quest::api::routes::build_app;
use quest::provider::ResearchModel;
use quest::types::{
    ErrorBody, Report, SessionStatus, SessionStatusView, StartResearchResponse,
};
use quest::{AppState, Orchestrator};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn scripted_provider() -> MockSearchProvider {
    MockSearchProvider::new()
        .respond(ResearchModel::Planning, plan_json(&["alpha topic", "beta topic"]))
        .respond_to(
            ResearchModel::Deep,
            "alpha",
            claims_response(&["X raises Y"], &["nasa.gov"]),
        )
        .respond_to(
            ResearchModel::Deep,
            "beta",
            claims_response(&["Y tracks X"], &["mit.edu"]),
        )
        .respond(ResearchModel::Validation, comparisons_json(&[(1, 0.9, false)]))
        .respond(ResearchModel::Summarization, "Section text [1].")
}

fn create_test_server(provider: MockSearchProvider) -> (TestServer, Arc<Orchestrator>) {
    let (orchestrator, _) = orchestrator_with(provider, test_config());
    let app = build_app(AppState::new(orchestrator.clone()));
    (TestServer::new(app).unwrap(), orchestrator)
}

async fn start(server: &TestServer, body: serde_json::Value) -> Uuid {
    let response = server.post("/research").json(&body).await;
    response.assert_status(StatusCode::ACCEPTED);
    let started: StartResearchResponse = response.json();
    assert_eq!(started.status, SessionStatus::Created);
    started.session_id
}

async fn finish(orchestrator: &Orchestrator, id: Uuid) {
    tokio::time::timeout(Duration::from_secs(15), orchestrator.wait(id))
        .await
        .expect("session did not finish in time")
        .unwrap();
}

#[tokio::test]
async fn test_health_check() {
    let (server, _) = create_test_server(MockSearchProvider::new());

    let response = server.get("/health").await;
    response.assert_status_ok();

    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.provider, "mock");
    assert_eq!(health.active_sessions, 0);
    assert_eq!(health.session_limit, 64);
    assert_eq!(health.stored_sessions, 0);
}

#[tokio::test]
async fn test_research_lifecycle() {
    let (server, orchestrator) = create_test_server(scripted_provider());

    let id = start(
        &server,
        json!({ "query": "impact of X on Y", "depth": "quick", "user_id": "alice" }),
    )
    .await;
    finish(&orchestrator, id).await;

    let response = server.get(&format!("/research/{}", id)).await;
    response.assert_status_ok();
    let status: SessionStatusView = response.json();
    assert_eq!(status.status, SessionStatus::Completed);
    assert!(status.last_sequence > 0);
    assert!(status.error.is_none());

    let response = server.get(&format!("/research/{}/report", id)).await;
    response.assert_status_ok();
    let report: Report = response.json();
    assert_eq!(report.session_id, id);
    assert_eq!(report.sections.len(), 2);
    assert_eq!(report.citations.len(), 2);
}

#[tokio::test]
async fn test_start_rejects_blank_query() {
    let (server, _) = create_test_server(MockSearchProvider::new());

    let response = server.post("/research").json(&json!({ "query": "   " })).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: ErrorBody = response.json();
    assert_eq!(body.kind, "InvalidInputError");
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let (server, _) = create_test_server(MockSearchProvider::new());
    let id = Uuid::new_v4();

    for path in [
        format!("/research/{}", id),
        format!("/research/{}/report", id),
        format!("/research/{}/events", id),
    ] {
        let response = server.get(&path).await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    let response = server.delete(&format!("/research/{}", id)).await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_report_before_completion_is_conflict() {
    let provider = MockSearchProvider::new().hang_all(ResearchModel::Planning);
    let (server, orchestrator) = create_test_server(provider);

    let id = start(&server, json!({ "query": "q" })).await;

    let response = server.get(&format!("/research/{}/report", id)).await;
    response.assert_status(StatusCode::CONFLICT);
    let body: ErrorBody = response.json();
    assert_eq!(body.kind, "NotReadyError");

    orchestrator.cancel(id).unwrap();
}

#[tokio::test]
async fn test_cancel_via_delete() {
    let provider = MockSearchProvider::new().hang_all(ResearchModel::Planning);
    let (server, _) = create_test_server(provider);

    let id = start(&server, json!({ "query": "q" })).await;

    let response = server.delete(&format!("/research/{}", id)).await;
    response.assert_status_ok();
    let status: SessionStatusView = response.json();
    assert_eq!(status.status, SessionStatus::Cancelled);

    let response = server.get(&format!("/research/{}/report", id)).await;
    response.assert_status(StatusCode::CONFLICT);
    let body: ErrorBody = response.json();
    assert_eq!(body.kind, "CancelledError");
}

#[tokio::test]
async fn test_failed_session_report_carries_error() {
    let provider = MockSearchProvider::new()
        .respond(ResearchModel::Planning, plan_json(&["alpha"]))
        .fail_all(
            ResearchModel::Deep,
            quest::AppError::permanent("401 Unauthorized"),
        );
    let (server, orchestrator) = create_test_server(provider);

    let id = start(&server, json!({ "query": "q" })).await;
    finish(&orchestrator, id).await;

    let response = server.get(&format!("/research/{}/report", id)).await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: ErrorBody = response.json();
    assert_eq!(body.kind, "ResearchExhaustedError");
}

#[tokio::test]
async fn test_event_stream_replays_as_sse() {
    let (server, orchestrator) = create_test_server(scripted_provider());

    let id = start(&server, json!({ "query": "q" })).await;
    finish(&orchestrator, id).await;

    let response = server.get(&format!("/research/{}/events", id)).await;
    response.assert_status_ok();

    let body = response.text();
    assert!(body.contains("id: 1\n"));
    assert!(body.contains("event: progress"));
    assert!(body.contains("event: thinking"));
    assert!(body.contains("created → planning"));

    let last = orchestrator.get_status(id).unwrap().last_sequence;
    assert!(body.contains(&format!("id: {}\n", last)));
}

#[tokio::test]
async fn test_list_sessions_by_user() {
    let provider = MockSearchProvider::new()
        .fail_all(ResearchModel::Planning, quest::AppError::permanent("unused"));
    let (server, orchestrator) = create_test_server(provider);

    let first = start(&server, json!({ "query": "one", "user_id": "alice" })).await;
    let second = start(&server, json!({ "query": "two", "user_id": "alice" })).await;
    let other = start(&server, json!({ "query": "three", "user_id": "bob" })).await;
    for id in [first, second, other] {
        finish(&orchestrator, id).await;
    }

    let response = server
        .get("/sessions")
        .add_query_param("user", "alice")
        .await;
    response.assert_status_ok();

    let list: ListSessionsResponse = response.json();
    assert_eq!(list.sessions.len(), 2);
    assert!(list
        .sessions
        .iter()
        .all(|s| s.session_id == first || s.session_id == second));
}
