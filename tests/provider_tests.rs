//! `HttpSearchProvider` against a mocked OpenAI-compatible upstream.

use quest::provider::{
    call_provider, HttpSearchProvider, ResearchModel, RetryPolicy, SearchOptions, SearchProvider,
};
use quest::types::{AppError, ProviderErrorKind};
use quest::utils::toml_config::ModelTable;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_for(server: &MockServer) -> HttpSearchProvider {
    HttpSearchProvider::new(
        server.uri(),
        Some("test-key".to_string()),
        ModelTable::default(),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "cmpl-1",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }],
        "citations": ["https://www.nasa.gov/report", "https://example.com/post"],
        "related_questions": ["How is Y measured?"]
    })
}

#[tokio::test]
async fn test_search_sends_mapped_model_and_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({ "model": "sonar-deep-research" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "X raises Y.\n\nThe effect is strongest in winter.",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let response = provider
        .search("impact of X on Y", ResearchModel::Deep, &SearchOptions::default())
        .await
        .unwrap();

    assert_eq!(response.claims.len(), 2);
    assert_eq!(response.claims[0].text, "X raises Y.");
    assert_eq!(response.sources.len(), 2);
    assert_eq!(response.sources[0].authority, 0.95);
    assert_eq!(response.sources[1].authority, 0.5);
    assert_eq!(response.related_questions, vec!["How is Y measured?"]);
    assert!(response.confidence.is_some());
}

#[tokio::test]
async fn test_system_prompt_is_sent_first() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "model": "sonar-reasoning-pro",
            "messages": [
                { "role": "system", "content": "Respond with JSON" },
                { "role": "user", "content": "plan this" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("{}")))
        .expect(1)
        .mount(&server)
        .await;

    let options = SearchOptions::default().with_system_prompt("Respond with JSON");
    provider_for(&server)
        .search("plan this", ResearchModel::Planning, &options)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rate_limit_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = provider_for(&server)
        .search("q", ResearchModel::Deep, &SearchOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::Provider {
            kind: ProviderErrorKind::Transient,
            ..
        }
    ));
}

#[tokio::test]
async fn test_unauthorized_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let err = provider_for(&server)
        .search("q", ResearchModel::Deep, &SearchOptions::default())
        .await
        .unwrap_err();

    assert!(!err.is_retryable());
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_transient_errors_are_retried_then_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let policy = RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(5),
        call_timeout: Duration::from_secs(5),
    };

    let err = call_provider(
        &provider,
        "q",
        ResearchModel::Deep,
        &SearchOptions::default(),
        &policy,
    )
    .await
    .unwrap_err();

    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_permanent_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let policy = RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(5),
        call_timeout: Duration::from_secs(5),
    };

    let err = call_provider(
        &provider,
        "q",
        ResearchModel::Deep,
        &SearchOptions::default(),
        &policy,
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), "ProviderError");
}

#[tokio::test]
async fn test_slow_upstream_hits_call_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("late"))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let policy = RetryPolicy {
        max_retries: 0,
        base_delay: Duration::from_millis(5),
        call_timeout: Duration::from_millis(200),
    };

    let err = call_provider(
        &provider,
        "q",
        ResearchModel::Deep,
        &SearchOptions::default(),
        &policy,
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), "ProviderError");
    assert!(matches!(
        err,
        AppError::Provider {
            kind: ProviderErrorKind::Transient,
            ref message,
        } if message.contains("timed out")
    ));
}
