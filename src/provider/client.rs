//! Search provider abstraction
//!
//! The [`SearchProvider`] trait is the only I/O boundary of the orchestrator:
//! every stage reaches the web-search-capable reasoning API through it, and
//! tests substitute a scripted implementation.

use crate::types::{Result, Source};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Pipeline phase a call is made for. The provider maps each phase to a
/// concrete upstream model through the configured model table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchModel {
    Planning,
    Deep,
    Validation,
    Summarization,
}

impl ResearchModel {
    pub fn as_str(self) -> &'static str {
        match self {
            ResearchModel::Planning => "planning",
            ResearchModel::Deep => "deep",
            ResearchModel::Validation => "validation",
            ResearchModel::Summarization => "summarization",
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub max_results: usize,
    pub want_related_questions: bool,
    pub want_reasoning_trace: bool,
    /// Instructions sent ahead of the query (e.g. the expected JSON shape).
    pub system_prompt: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 5,
            want_related_questions: false,
            want_reasoning_trace: false,
            system_prompt: None,
        }
    }
}

impl SearchOptions {
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    pub fn with_related_questions(mut self) -> Self {
        self.want_related_questions = true;
        self
    }

    pub fn with_reasoning_trace(mut self) -> Self {
        self.want_reasoning_trace = true;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// One claim extracted by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    pub text: String,
    #[serde(default = "default_relevance")]
    pub relevance: f32,
    /// Claim-level confidence, overriding the response-level one.
    #[serde(default)]
    pub confidence: Option<f32>,
    /// Indices into [`SearchResponse::sources`]. Empty means "all sources".
    #[serde(default)]
    pub sources: Vec<usize>,
}

fn default_relevance() -> f32 {
    1.0
}

impl Claim {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            relevance: default_relevance(),
            confidence: None,
            sources: Vec::new(),
        }
    }
}

/// Result of one provider call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    /// Raw text answer. Structured answers (plans, comparisons) are JSON in here.
    pub content: String,
    #[serde(default)]
    pub claims: Vec<Claim>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub related_questions: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl SearchResponse {
    /// Sources a claim refers to, resolving "no indices" to every source.
    pub fn sources_for(&self, claim: &Claim) -> Vec<Source> {
        if claim.sources.is_empty() {
            return self.sources.clone();
        }
        claim
            .sources
            .iter()
            .filter_map(|&idx| self.sources.get(idx).cloned())
            .collect()
    }
}

/// Capability interface wrapping a query → results call with model selection.
///
/// Implementations report failures as [`crate::types::AppError::Provider`]
/// with a transient or permanent kind; callers decide whether to retry.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        model: ResearchModel,
        options: &SearchOptions,
    ) -> Result<SearchResponse>;

    /// Short identifier used in logs.
    fn name(&self) -> &str;
}

/// Pull the first JSON object out of a model answer.
///
/// Models wrap JSON in prose or code fences; this takes the span from the
/// first `{` to the last `}` and parses it.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
