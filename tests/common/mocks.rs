//! Mock implementations for testing.
//!
//! [`MockSearchProvider`] answers provider calls from scripted rules keyed by
//! model and (optionally) a fragment of the query text, so a whole session can
//! be driven without network access. Every call is recorded, which lets tests
//! assert what was asked and that nothing was asked after a cancel.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use quest::provider::{Claim, ResearchModel, SearchOptions, SearchProvider, SearchResponse};
use quest::types::{AppError, Result, Source};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Clone)]
enum Reply {
    Respond(SearchResponse),
    Fail(AppError),
    /// Never answers; the caller's timeout has to fire.
    Hang,
}

struct Rule {
    model: ResearchModel,
    pattern: Option<String>,
    reply: Reply,
}

/// One call as the provider saw it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: ResearchModel,
    pub query: String,
    pub at: Instant,
}

/// Scriptable search provider.
///
/// Rules with a query pattern take precedence over model-wide rules. A call
/// that matches no rule fails with a permanent provider error.
///
/// # Examples
///
/// ```ignore
/// let provider = MockSearchProvider::new()
///     .respond(ResearchModel::Planning, plan_json(&["alpha", "beta"]))
///     .respond_to(ResearchModel::Deep, "alpha", claims_response(&["A"], &["nasa.gov"]))
///     .fail_on(ResearchModel::Deep, "beta", AppError::permanent("boom"))
///     .with_latency(Duration::from_millis(50));
/// ```
#[derive(Default)]
pub struct MockSearchProvider {
    rules: Vec<Rule>,
    latency: Duration,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockSearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call for `model` with `content` as plain text.
    pub fn respond(self, model: ResearchModel, content: impl Into<String>) -> Self {
        self.rule(model, None, Reply::Respond(text(content)))
    }

    /// Answer calls for `model` whose query contains `pattern`.
    pub fn respond_to(
        self,
        model: ResearchModel,
        pattern: &str,
        response: SearchResponse,
    ) -> Self {
        self.rule(model, Some(pattern), Reply::Respond(response))
    }

    /// Fail calls for `model` whose query contains `pattern`.
    pub fn fail_on(self, model: ResearchModel, pattern: &str, err: AppError) -> Self {
        self.rule(model, Some(pattern), Reply::Fail(err))
    }

    /// Fail every call for `model`.
    pub fn fail_all(self, model: ResearchModel, err: AppError) -> Self {
        self.rule(model, None, Reply::Fail(err))
    }

    /// Never answer calls for `model`.
    pub fn hang_all(self, model: ResearchModel) -> Self {
        self.rule(model, None, Reply::Hang)
    }

    /// Delay every answer.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn rule(mut self, model: ResearchModel, pattern: Option<&str>, reply: Reply) -> Self {
        self.rules.push(Rule {
            model,
            pattern: pattern.map(str::to_string),
            reply,
        });
        self
    }

    fn reply_for(&self, query: &str, model: ResearchModel) -> Option<Reply> {
        let for_model = || self.rules.iter().filter(move |r| r.model == model);
        for_model()
            .find(|r| r.pattern.as_deref().is_some_and(|p| query.contains(p)))
            .or_else(|| for_model().find(|r| r.pattern.is_none()))
            .map(|r| r.reply.clone())
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, model: ResearchModel) -> usize {
        self.calls.lock().iter().filter(|c| c.model == model).count()
    }

    /// Highest number of calls observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn search(
        &self,
        query: &str,
        model: ResearchModel,
        _options: &SearchOptions,
    ) -> Result<SearchResponse> {
        self.calls.lock().push(RecordedCall {
            model,
            query: query.to_string(),
            at: Instant::now(),
        });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match self.reply_for(query, model) {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(AppError::permanent(format!(
                "No scripted {} response for: {}",
                model.as_str(),
                query
            ))),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============= Response Builders =============

/// Plain-text response.
pub fn text(content: impl Into<String>) -> SearchResponse {
    SearchResponse {
        content: content.into(),
        ..Default::default()
    }
}

/// Planning answer listing `queries` in priority order.
pub fn plan_json(queries: &[&str]) -> String {
    serde_json::json!({
        "strategy": "cover each angle separately",
        "sub_queries": queries,
    })
    .to_string()
}

/// Research answer with one claim per entry, each backed by every source.
/// Sources are `https://{host}/article` with authority 0.6.
pub fn claims_response(claims: &[&str], hosts: &[&str]) -> SearchResponse {
    claims_with_confidence(claims, hosts, 0.6)
}

/// Like [`claims_response`] with an explicit response confidence.
pub fn claims_with_confidence(claims: &[&str], hosts: &[&str], confidence: f32) -> SearchResponse {
    SearchResponse {
        content: claims.join("\n\n"),
        claims: claims.iter().map(|c| Claim::new(*c)).collect(),
        sources: hosts.iter().map(|h| source(h, 0.6)).collect(),
        confidence: Some(confidence),
        ..Default::default()
    }
}

pub fn source(host: &str, authority: f32) -> Source {
    Source {
        url: format!("https://{}/article", host),
        title: format!("Article on {}", host),
        snippet: String::new(),
        authority,
    }
}

/// Validation answer: `(index, similarity, contradicts)` per compared finding.
pub fn comparisons_json(comparisons: &[(usize, f32, bool)]) -> String {
    let items: Vec<serde_json::Value> = comparisons
        .iter()
        .map(|(index, similarity, contradicts)| {
            serde_json::json!({
                "index": index,
                "similarity": similarity,
                "contradicts": contradicts,
            })
        })
        .collect();
    serde_json::json!({ "comparisons": items }).to_string()
}
