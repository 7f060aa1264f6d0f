use super::{excerpt, StageScope};
use crate::provider::{extract_json, ResearchModel, SearchOptions, SearchResponse};
use crate::types::{AppError, EventKind, ResearchOptions, ResearchPlan, Result, Stage, SubQuery};
use serde_json::Value;
use std::collections::HashSet;

const PLANNING_SYSTEM_PROMPT: &str = r#"You are a research planner. Decompose the user's research question into focused sub-questions that can each be answered by one web search.

Respond with JSON only, in this shape:
{"strategy": "<one sentence>", "sub_queries": [{"query": "<question>", "rationale": "<why it matters>", "priority": <0.0-1.0>}]}"#;

/// A sub-query as proposed by the provider, before capping.
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    text: String,
    rationale: String,
    priority: Option<f32>,
}

/// Turns one root query into an ordered, capped [`ResearchPlan`].
pub struct PlanningStage {
    max_sub_queries: usize,
}

impl PlanningStage {
    pub fn new(max_sub_queries: usize) -> Self {
        Self {
            max_sub_queries: max_sub_queries.max(1),
        }
    }

    /// Effective cap: the caller's breadth can only lower the configured maximum.
    pub fn cap_for(&self, options: &ResearchOptions) -> usize {
        options
            .breadth
            .map(|b| b.clamp(1, self.max_sub_queries))
            .unwrap_or(self.max_sub_queries)
    }

    pub async fn run(
        &self,
        scope: &StageScope,
        query: &str,
        options: &ResearchOptions,
    ) -> Result<ResearchPlan> {
        let cap = self.cap_for(options);
        scope.thinking(
            Stage::Planning,
            format!("Decomposing \"{}\" into at most {} sub-queries", excerpt(query, 80), cap),
        );

        let prompt = planning_prompt(query, options, cap);
        let search_options = SearchOptions::default()
            .with_related_questions()
            .with_system_prompt(PLANNING_SYSTEM_PROMPT);

        let response = scope
            .call(&prompt, ResearchModel::Planning, &search_options)
            .await
            .map_err(|e| match e {
                cancelled @ AppError::Cancelled(_) => cancelled,
                other => AppError::Planning(format!("Planning call failed: {}", other)),
            })?;

        let plan = parse_plan(&response, cap)?;

        if !plan.strategy.is_empty() {
            scope.thinking(Stage::Planning, format!("Strategy: {}", plan.strategy));
        }
        for sub_query in &plan.sub_queries {
            scope.thinking(
                Stage::Planning,
                format!(
                    "Sub-query {} (priority {:.2}): {}",
                    sub_query.id + 1,
                    sub_query.priority,
                    sub_query.text
                ),
            );
        }
        scope.emit(
            Stage::Planning,
            EventKind::Result,
            format!(
                "Planned {} sub-queries, {} follow-up questions",
                plan.sub_queries.len(),
                plan.follow_up_questions.len()
            ),
            None,
        );

        Ok(plan)
    }
}

fn planning_prompt(query: &str, options: &ResearchOptions, cap: usize) -> String {
    let mut prompt = format!(
        "Research question: {}\n\nPropose up to {} sub-questions for a {} investigation.",
        query,
        cap,
        options.depth.as_str()
    );
    if let Some(domain) = &options.domain {
        prompt.push_str(&format!("\nFocus on the {} domain.", domain));
    }
    prompt
}

/// Build the plan from a planning response.
///
/// Blank and duplicate (case-insensitive) candidates are dropped, priorities
/// are clamped to `[0, 1]` and candidates are stably sorted by priority before
/// the lowest ones are cut to fit `cap`.
fn parse_plan(response: &SearchResponse, cap: usize) -> Result<ResearchPlan> {
    let structured = extract_json(&response.content);

    let mut candidates = structured
        .as_ref()
        .and_then(|v| v.get("sub_queries").or_else(|| v.get("queries")))
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(candidate_from_json).collect::<Vec<_>>())
        .unwrap_or_default();

    if candidates.is_empty() {
        candidates = numbered_lines(&response.content);
    }

    let mut seen = HashSet::new();
    candidates.retain(|c| !c.text.is_empty() && seen.insert(c.text.to_lowercase()));

    if candidates.is_empty() {
        return Err(AppError::Planning(
            "Provider returned zero usable sub-queries".to_string(),
        ));
    }

    let count = candidates.len();
    let mut weighted: Vec<(Candidate, f32)> = candidates
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            let priority = c
                .priority
                .unwrap_or(1.0 - i as f32 / count as f32)
                .clamp(0.0, 1.0);
            (c, priority)
        })
        .collect();

    weighted.sort_by(|a, b| b.1.total_cmp(&a.1));
    weighted.truncate(cap);

    let sub_queries = weighted
        .into_iter()
        .enumerate()
        .map(|(id, (c, priority))| SubQuery {
            id,
            text: c.text,
            rationale: c.rationale,
            priority,
        })
        .collect();

    let strategy = structured
        .as_ref()
        .and_then(|v| v.get("strategy"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    let mut follow_up_questions = response.related_questions.clone();
    if let Some(extra) = structured
        .as_ref()
        .and_then(|v| v.get("related_questions"))
        .and_then(Value::as_array)
    {
        follow_up_questions.extend(extra.iter().filter_map(Value::as_str).map(str::to_string));
    }
    let mut seen = HashSet::new();
    follow_up_questions.retain(|q| !q.trim().is_empty() && seen.insert(q.to_lowercase()));

    Ok(ResearchPlan {
        strategy,
        sub_queries,
        follow_up_questions,
    })
}

fn candidate_from_json(item: &Value) -> Option<Candidate> {
    match item {
        Value::String(text) => Some(Candidate {
            text: text.trim().to_string(),
            rationale: String::new(),
            priority: None,
        }),
        Value::Object(map) => {
            let text = map
                .get("query")
                .or_else(|| map.get("text"))
                .or_else(|| map.get("question"))
                .and_then(Value::as_str)?;
            Some(Candidate {
                text: text.trim().to_string(),
                rationale: map
                    .get("rationale")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
                priority: map
                    .get("priority")
                    .or_else(|| map.get("weight"))
                    .and_then(Value::as_f64)
                    .map(|p| p as f32),
            })
        }
        _ => None,
    }
}

/// Fallback for prose answers: list items like `1. ...`, `2) ...` or `- ...`.
fn numbered_lines(content: &str) -> Vec<Candidate> {
    content
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            let rest = if line.starts_with(|c: char| c.is_ascii_digit()) {
                let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
                rest.strip_prefix('.').or_else(|| rest.strip_prefix(')'))?
            } else {
                line.strip_prefix("- ").or_else(|| line.strip_prefix("* "))?
            };
            Some(Candidate {
                text: rest.trim().to_string(),
                rationale: String::new(),
                priority: None,
            })
        })
        .collect()
}
