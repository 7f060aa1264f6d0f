use super::{excerpt, StageScope};
use crate::provider::{ResearchModel, SearchOptions, SearchResponse};
use crate::types::{
    AppError, EventKind, Finding, ResearchOptions, ResearchPlan, Result, Stage, SubQuery,
};
use std::collections::VecDeque;
use tokio::task::JoinSet;
use tracing::{info, warn};

const RESEARCH_SYSTEM_PROMPT: &str = r#"You are a research assistant with web search. Answer the question with specific, sourced claims.

Prefer JSON in this shape:
{"claims": [{"text": "<claim>", "relevance": <0.0-1.0>, "confidence": <0.0-1.0>, "sources": [<index into the search results>]}], "confidence": <0.0-1.0>}"#;

/// Confidence used when neither the claim nor the response carries one.
const DEFAULT_FINDING_CONFIDENCE: f32 = 0.5;

/// Executes every sub-query of a plan concurrently and merges the findings.
pub struct ResearchStage {
    /// Maximum in-flight calls for one session. Remaining sub-queries wait FIFO.
    concurrency: usize,
}

impl ResearchStage {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Fan out one call per sub-query and fan the findings back in.
    ///
    /// A failed or timed-out call yields no findings and an `error` event, but
    /// never aborts its siblings. The stage fails with
    /// [`AppError::ResearchExhausted`] only when no call produced a finding.
    /// Cancellation is observed at every sub-query boundary; queued sub-queries
    /// are then dropped without being started and in-flight calls are aborted.
    pub async fn run(
        &self,
        scope: &StageScope,
        plan: &ResearchPlan,
        options: &ResearchOptions,
    ) -> Result<Vec<Finding>> {
        let total = plan.sub_queries.len();
        let search_options = SearchOptions::default()
            .with_max_results(options.depth.max_results())
            .with_reasoning_trace()
            .with_system_prompt(RESEARCH_SYSTEM_PROMPT);

        scope.thinking(
            Stage::Research,
            format!(
                "Researching {} sub-queries, up to {} at a time",
                total, self.concurrency
            ),
        );

        let mut queue: VecDeque<SubQuery> = plan.sub_queries.iter().cloned().collect();
        let mut in_flight = JoinSet::new();
        let mut findings = Vec::new();
        let mut failed = 0usize;

        loop {
            while in_flight.len() < self.concurrency {
                let Some(sub_query) = queue.pop_front() else {
                    break;
                };
                scope.check_cancelled()?;
                let task_scope = scope.clone();
                let task_options = search_options.clone();
                in_flight.spawn(async move {
                    let result = task_scope
                        .call(&sub_query.text, ResearchModel::Deep, &task_options)
                        .await;
                    (sub_query, result)
                });
            }

            if in_flight.is_empty() {
                break;
            }

            let joined = tokio::select! {
                biased;
                _ = scope.cancel.cancelled() => {
                    in_flight.abort_all();
                    return Err(AppError::Cancelled(format!(
                        "Session {} was cancelled during research",
                        scope.session_id
                    )));
                }
                joined = in_flight.join_next() => joined,
            };

            match joined {
                Some(Ok((sub_query, Ok(response)))) => {
                    let produced = findings_from_response(
                        &sub_query,
                        &response,
                        options.depth.max_results(),
                    );
                    if let Some(reasoning) = &response.reasoning {
                        scope.thinking(
                            Stage::Research,
                            format!("[{}] {}", sub_query.id + 1, excerpt(reasoning, 240)),
                        );
                    }
                    scope.emit(
                        Stage::Research,
                        EventKind::Result,
                        format!(
                            "Sub-query {} returned {} findings: {}",
                            sub_query.id + 1,
                            produced.len(),
                            excerpt(&sub_query.text, 80)
                        ),
                        response.confidence,
                    );
                    findings.extend(produced);
                }
                Some(Ok((_, Err(e @ AppError::Cancelled(_))))) => return Err(e),
                Some(Ok((sub_query, Err(e)))) => {
                    failed += 1;
                    warn!(
                        session_id = %scope.session_id,
                        sub_query = sub_query.id,
                        "Sub-query failed: {}",
                        e
                    );
                    scope.error(Stage::Research, &e);
                }
                Some(Err(join_err)) => {
                    failed += 1;
                    scope.error(
                        Stage::Research,
                        &AppError::Internal(format!("Research task failed: {}", join_err)),
                    );
                }
                None => break,
            }
        }

        info!(
            session_id = %scope.session_id,
            findings = findings.len(),
            failed,
            total,
            "Research fan-in complete"
        );

        if findings.is_empty() {
            let reason = if failed == total {
                format!("all {} sub-query calls failed", total)
            } else {
                format!("{} sub-query calls produced no findings", total)
            };
            return Err(AppError::ResearchExhausted(format!(
                "No information could be gathered: {}",
                reason
            )));
        }

        Ok(merge_findings(findings))
    }
}

/// One finding per non-blank claim, at most `max_results` per call.
fn findings_from_response(
    sub_query: &SubQuery,
    response: &SearchResponse,
    max_results: usize,
) -> Vec<Finding> {
    response
        .claims
        .iter()
        .filter(|claim| !claim.text.trim().is_empty())
        .take(max_results)
        .map(|claim| Finding {
            id: 0,
            sub_query_id: sub_query.id,
            claim: claim.text.trim().to_string(),
            sources: response.sources_for(claim),
            confidence: claim
                .confidence
                .or(response.confidence)
                .unwrap_or(DEFAULT_FINDING_CONFIDENCE)
                .clamp(0.0, 1.0),
            relevance: claim.relevance.clamp(0.0, 1.0),
        })
        .collect()
}

/// Order by sub-query priority (plan order), then relevance, and number the result.
fn merge_findings(mut findings: Vec<Finding>) -> Vec<Finding> {
    findings.sort_by(|a, b| {
        a.sub_query_id
            .cmp(&b.sub_query_id)
            .then_with(|| b.relevance.total_cmp(&a.relevance))
    });
    for (id, finding) in findings.iter_mut().enumerate() {
        finding.id = id;
    }
    findings
}
