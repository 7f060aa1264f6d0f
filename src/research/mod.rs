//! Research Pipeline Stages
//!
//! The four stages a session is driven through, leaves first:
//!
//! - [`planner::PlanningStage`] - Decomposes the root query into a capped, prioritized plan
//! - [`researcher::ResearchStage`] - Concurrent fan-out of sub-queries, fan-in of findings
//! - [`validator::ValidationStage`] - Cross-checks findings and derives verdicts
//! - [`summarizer::SummarizationStage`] - Synthesizes the report with resolved citations
//!
//! Stages never touch the session record. They receive their inputs, publish
//! events through a [`StageScope`] and return their output to the orchestrator.
//!
//! # Shared Context
//!
//! [`ResearchContext`] bundles the provider, configuration, event bus and the
//! global provider-call gate. It is constructed once and injected; there are
//! no process-wide singletons.

/// Query decomposition.
pub mod planner;
/// Sub-query fan-out/fan-in.
pub mod researcher;
/// Report synthesis.
pub mod summarizer;
/// Finding cross-validation.
pub mod validator;

pub use planner::PlanningStage;
pub use researcher::ResearchStage;
pub use summarizer::SummarizationStage;
pub use validator::ValidationStage;

use crate::events::EventBus;
use crate::provider::{
    call_provider_gated, ResearchModel, RetryPolicy, SearchOptions, SearchProvider,
    SearchResponse,
};
use crate::types::{AgentEvent, AppError, EventKind, Result, Stage};
use crate::utils::toml_config::QuestConfig;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Dependencies shared by every session.
pub struct ResearchContext {
    pub provider: Arc<dyn SearchProvider>,
    pub config: Arc<QuestConfig>,
    pub events: Arc<EventBus>,
    /// Bounds in-flight provider calls across all sessions. Waiters queue FIFO.
    pub global_gate: Arc<Semaphore>,
    pub retry_policy: RetryPolicy,
}

impl ResearchContext {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        config: Arc<QuestConfig>,
        events: Arc<EventBus>,
    ) -> Self {
        let global_gate = Arc::new(Semaphore::new(config.research.global_concurrency.max(1)));
        let retry_policy = RetryPolicy::from_config(&config.research);
        Self {
            provider,
            config,
            events,
            global_gate,
            retry_policy,
        }
    }
}

/// Per-session view of the context handed to each stage.
#[derive(Clone)]
pub struct StageScope {
    pub ctx: Arc<ResearchContext>,
    pub session_id: Uuid,
    pub cancel: CancellationToken,
}

impl StageScope {
    pub fn new(ctx: Arc<ResearchContext>, session_id: Uuid, cancel: CancellationToken) -> Self {
        Self {
            ctx,
            session_id,
            cancel,
        }
    }

    pub fn emit(
        &self,
        stage: Stage,
        kind: EventKind,
        payload: impl Into<String>,
        confidence: Option<f32>,
    ) -> Option<AgentEvent> {
        self.ctx
            .events
            .publish(self.session_id, stage, kind, payload, confidence)
    }

    pub fn thinking(&self, stage: Stage, payload: impl Into<String>) {
        self.emit(stage, EventKind::Thinking, payload, None);
    }

    /// Record a stage-local failure as an `error` event.
    pub fn error(&self, stage: Stage, err: &AppError) {
        self.emit(
            stage,
            EventKind::Error,
            format!("{}: {}", err.kind(), err),
            None,
        );
    }

    /// Cancellation checkpoint.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(AppError::Cancelled(format!(
                "Session {} was cancelled",
                self.session_id
            )))
        } else {
            Ok(())
        }
    }

    /// One logical provider call under the retry policy. Each attempt holds
    /// a global permit, released while backing off. Cancellation interrupts
    /// both the wait and the call, and no call is issued once the session
    /// is cancelled.
    pub async fn call(
        &self,
        query: &str,
        model: ResearchModel,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        self.check_cancelled()?;
        let ctx = &self.ctx;
        let gated = call_provider_gated(
            ctx.provider.as_ref(),
            query,
            model,
            options,
            &ctx.retry_policy,
            Some(ctx.global_gate.as_ref()),
        );

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AppError::Cancelled(format!(
                "Session {} was cancelled",
                self.session_id
            ))),
            result = gated => result,
        }
    }
}

/// Clip text for event payloads.
pub(crate) fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
