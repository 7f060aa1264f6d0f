//! HTTP search provider for OpenAI-compatible search/reasoning APIs.
//!
//! Speaks `POST {endpoint}/chat/completions` with bearer authentication and
//! reads the answer, citations, search results and related questions from the
//! response body. Status 408, 429 and 5xx (and network failures) are reported
//! as transient so callers retry them; every other failure is permanent.

use super::authority::{authority_for_url, research_confidence};
use super::client::{
    extract_json, Claim, ResearchModel, SearchOptions, SearchProvider, SearchResponse,
};
use crate::types::{AppError, Result, Source};
use crate::utils::toml_config::{ModelTable, QuestConfig};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("quest-server/", env!("CARGO_PKG_VERSION"));

pub struct HttpSearchProvider {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    models: ModelTable,
}

impl HttpSearchProvider {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        models: ModelTable,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            models,
        })
    }

    /// Build from configuration, resolving the API key from the environment.
    /// A missing key is allowed so local, unauthenticated gateways work.
    pub fn from_config(config: &QuestConfig) -> Result<Self> {
        let api_key = config.api_key().ok();
        if api_key.is_none() {
            tracing::warn!(
                env = %config.provider.api_key_env,
                "Provider API key not set; sending unauthenticated requests"
            );
        }
        Self::new(
            config.provider.endpoint.clone(),
            api_key,
            config.models.clone(),
            Duration::from_secs(config.provider.request_timeout_secs),
        )
    }

    fn request_body(&self, query: &str, model: ResearchModel, options: &SearchOptions) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &options.system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": query }));

        json!({
            "model": self.models.model_for(model),
            "messages": messages,
            "temperature": 0.2,
            "return_related_questions": options.want_related_questions,
        })
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    async fn search(
        &self,
        query: &str,
        model: ResearchModel,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        let url = format!("{}/chat/completions", self.endpoint);
        let body = self.request_body(query, model, options);

        debug!(model = self.models.model_for(model), "Provider request");

        let mut request = self.http_client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::transient(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = format!("Provider request failed ({}): {}", status, text);
            return Err(if is_transient_status(status) {
                AppError::transient(message)
            } else {
                AppError::permanent(message)
            });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| AppError::permanent(format!("Failed to parse response: {}", e)))?;

        parse_response(&data, options)
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Turn a chat-completions body into a [`SearchResponse`].
pub(crate) fn parse_response(data: &Value, options: &SearchOptions) -> Result<SearchResponse> {
    let raw = data
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::permanent("Invalid response format: missing choices"))?;

    let (reasoning, content) = split_reasoning(raw);
    let sources = parse_sources(data);
    let related_questions = data
        .get("related_questions")
        .and_then(Value::as_array)
        .map(|qs| {
            qs.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let structured = extract_json(&content);
    let claims = structured
        .as_ref()
        .and_then(|v| v.get("claims"))
        .and_then(|c| serde_json::from_value::<Vec<Claim>>(c.clone()).ok())
        .unwrap_or_else(|| paragraph_claims(&content, options.max_results));

    let confidence = structured
        .as_ref()
        .and_then(|v| v.get("confidence"))
        .and_then(Value::as_f64)
        .map(|c| (c as f32).clamp(0.0, 1.0))
        .unwrap_or_else(|| research_confidence(&sources, &content));

    Ok(SearchResponse {
        content,
        claims,
        sources,
        related_questions,
        confidence: Some(confidence),
        reasoning: if options.want_reasoning_trace {
            reasoning
        } else {
            None
        },
    })
}

/// Separate a leading `<think>…</think>` block emitted by reasoning models.
fn split_reasoning(raw: &str) -> (Option<String>, String) {
    if let Some(start) = raw.find("<think>") {
        if let Some(end) = raw.find("</think>") {
            if end > start {
                let reasoning = raw[start + "<think>".len()..end].trim().to_string();
                let mut content = String::with_capacity(raw.len());
                content.push_str(&raw[..start]);
                content.push_str(&raw[end + "</think>".len()..]);
                return (Some(reasoning), content.trim().to_string());
            }
        }
    }
    (None, raw.trim().to_string())
}

/// Prefer rich `search_results`; fall back to bare `citations`.
fn parse_sources(data: &Value) -> Vec<Source> {
    if let Some(results) = data.get("search_results").and_then(Value::as_array) {
        let sources: Vec<Source> = results
            .iter()
            .filter_map(|r| {
                let url = r.get("url")?.as_str()?.to_string();
                let title = r
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or(&url)
                    .to_string();
                let snippet = r
                    .get("snippet")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let authority = authority_for_url(&url);
                Some(Source {
                    url,
                    title,
                    snippet,
                    authority,
                })
            })
            .collect();
        if !sources.is_empty() {
            return sources;
        }
    }

    data.get("citations")
        .and_then(Value::as_array)
        .map(|citations| {
            citations
                .iter()
                .filter_map(|c| match c {
                    Value::String(url) => Some(url.clone()),
                    Value::Object(_) => c.get("url").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .map(|url| Source {
                    title: url.clone(),
                    snippet: String::new(),
                    authority: authority_for_url(&url),
                    url,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// One claim per paragraph, relevance decreasing with position.
fn paragraph_claims(content: &str, max: usize) -> Vec<Claim> {
    content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .take(max.max(1))
        .enumerate()
        .map(|(i, p)| Claim {
            relevance: (1.0 - i as f32 * 0.1).max(0.1),
            ..Claim::new(p)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_answer() {
        let data = json!({
            "choices": [{ "message": { "content": "First point.\n\nSecond point." } }],
            "citations": ["https://www.nasa.gov/a", "https://blog.example.com/b"],
            "related_questions": ["What next?"]
        });

        let response = parse_response(&data, &SearchOptions::default()).unwrap();

        assert_eq!(response.claims.len(), 2);
        assert_eq!(response.claims[0].text, "First point.");
        assert!(response.claims[0].relevance > response.claims[1].relevance);
        assert_eq!(response.sources.len(), 2);
        assert_eq!(response.sources[0].authority, 0.95);
        assert_eq!(response.related_questions, vec!["What next?".to_string()]);
        assert!(response.confidence.is_some());
    }

    #[test]
    fn test_parse_structured_claims() {
        let content = r#"{"claims": [{"text": "X raises Y", "relevance": 0.9, "sources": [0]}], "confidence": 0.7}"#;
        let data = json!({
            "choices": [{ "message": { "content": content } }],
            "search_results": [{ "url": "https://mit.edu/x", "title": "MIT study", "snippet": "..." }]
        });

        let response = parse_response(&data, &SearchOptions::default()).unwrap();

        assert_eq!(response.claims.len(), 1);
        assert_eq!(response.claims[0].sources, vec![0]);
        assert_eq!(response.confidence, Some(0.7));
        assert_eq!(response.sources[0].title, "MIT study");
    }

    #[test]
    fn test_reasoning_trace_is_split_off() {
        let data = json!({
            "choices": [{ "message": { "content": "<think>step 1</think>\nAnswer." } }]
        });

        let with_trace = SearchOptions::default().with_reasoning_trace();
        let response = parse_response(&data, &with_trace).unwrap();
        assert_eq!(response.reasoning.as_deref(), Some("step 1"));
        assert_eq!(response.content, "Answer.");

        let response = parse_response(&data, &SearchOptions::default()).unwrap();
        assert!(response.reasoning.is_none());
    }

    #[test]
    fn test_missing_choices_is_permanent() {
        let err = parse_response(&json!({ "id": "x" }), &SearchOptions::default()).unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "ProviderError");
    }

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(is_transient_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
    }
}
