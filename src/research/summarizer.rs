use super::{excerpt, StageScope};
use crate::provider::{ResearchModel, SearchOptions};
use crate::types::{
    AppError, Citation, EventKind, Finding, Report, ReportSection, ResearchPlan, Result, Source,
    Stage, SubQuery, ValidationVerdict, VerdictStatus,
};
use chrono::Utc;
use std::collections::HashMap;
use tracing::warn;

const SUMMARY_SYSTEM_PROMPT: &str = "You are a research writer. Write one concise, well-structured section that answers the question using only the numbered findings. Keep the citation markers like [1] next to the statements they support. Mention disputed findings as disputed.";

/// Deduplicated citation list, ordered by first appearance.
#[derive(Default)]
struct CitationIndex {
    by_url: HashMap<String, usize>,
    citations: Vec<Citation>,
}

impl CitationIndex {
    /// 1-based citation index for a source, allocating on first sight.
    fn cite(&mut self, source: &Source) -> usize {
        if let Some(&index) = self.by_url.get(&source.url) {
            return index;
        }
        let index = self.citations.len() + 1;
        self.by_url.insert(source.url.clone(), index);
        self.citations.push(Citation {
            index,
            url: source.url.clone(),
            title: source.title.clone(),
        });
        index
    }
}

/// A section before its body is written.
struct SectionDraft<'a> {
    sub_query: &'a SubQuery,
    entries: Vec<Entry<'a>>,
}

struct Entry<'a> {
    finding: &'a Finding,
    status: VerdictStatus,
    confidence: f32,
    citations: Vec<usize>,
}

impl SectionDraft<'_> {
    fn disputed(&self) -> Vec<usize> {
        self.entries
            .iter()
            .filter(|e| e.status == VerdictStatus::Contradicted)
            .map(|e| e.finding.id)
            .collect()
    }

    fn corroborated(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == VerdictStatus::Corroborated)
            .count()
    }

    /// Mean verdict confidence of the non-contradicted entries, or of all
    /// entries when every one is contradicted.
    fn confidence(&self) -> f32 {
        let accepted: Vec<f32> = self
            .entries
            .iter()
            .filter(|e| e.status != VerdictStatus::Contradicted)
            .map(|e| e.confidence)
            .collect();
        let values = if accepted.is_empty() {
            self.entries.iter().map(|e| e.confidence).collect()
        } else {
            accepted
        };
        mean(&values)
    }

    fn citations(&self) -> Vec<usize> {
        let mut all: Vec<usize> = self
            .entries
            .iter()
            .flat_map(|e| e.citations.iter().copied())
            .collect();
        all.sort_unstable();
        all.dedup();
        all
    }

    fn markers(entry: &Entry<'_>) -> String {
        entry
            .citations
            .iter()
            .map(|i| format!("[{}]", i))
            .collect::<String>()
    }

    fn prompt(&self, query: &str) -> String {
        let mut prompt = format!(
            "Overall research question: {}\nSection question: {}\n\nFindings:\n",
            query, self.sub_query.text
        );
        for entry in &self.entries {
            let status = match entry.status {
                VerdictStatus::Corroborated => "corroborated",
                VerdictStatus::Contradicted => "disputed",
                VerdictStatus::Unverifiable => "unverified",
            };
            prompt.push_str(&format!(
                "- ({}) {} {}\n",
                status,
                entry.finding.claim,
                Self::markers(entry)
            ));
        }
        prompt
    }

    /// Local fallback body: the findings as a bullet list.
    fn findings_dump(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                let mut line = format!("- {}", entry.finding.claim);
                let markers = Self::markers(entry);
                if !markers.is_empty() {
                    line.push(' ');
                    line.push_str(&markers);
                }
                match entry.status {
                    VerdictStatus::Contradicted => line.push_str(" (disputed)"),
                    VerdictStatus::Corroborated => line.push_str(" (corroborated)"),
                    VerdictStatus::Unverifiable => {}
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

/// Synthesizes findings and verdicts into a [`Report`].
///
/// One section per sub-query that produced findings, in plan order. Citations
/// come only from non-contradicted findings. A failed synthesis call degrades
/// that section to a findings dump and nothing to summarize yields an empty
/// degraded report. Only cancellation fails the stage.
#[derive(Default)]
pub struct SummarizationStage;

impl SummarizationStage {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(
        &self,
        scope: &StageScope,
        query: &str,
        plan: &ResearchPlan,
        findings: &[Finding],
        verdicts: &[ValidationVerdict],
    ) -> Result<Report> {
        let (drafts, citations) = draft_sections(plan, findings, verdicts);
        if drafts.is_empty() {
            let err = AppError::Summarization("No findings to summarize".to_string());
            warn!(session_id = %scope.session_id, "{}", err);
            scope.error(Stage::Summarization, &err);
        }

        let total = drafts.len();
        let mut sections = Vec::with_capacity(total);
        for (n, draft) in drafts.iter().enumerate() {
            scope.check_cancelled()?;
            scope.thinking(
                Stage::Summarization,
                format!(
                    "Writing section {} of {}: {}",
                    n + 1,
                    total,
                    excerpt(&draft.sub_query.text, 80)
                ),
            );

            let options = SearchOptions::default().with_system_prompt(SUMMARY_SYSTEM_PROMPT);
            let synthesized = match scope
                .call(&draft.prompt(query), ResearchModel::Summarization, &options)
                .await
            {
                Ok(response) if !response.content.trim().is_empty() => {
                    Ok(response.content.trim().to_string())
                }
                Ok(_) => Err(AppError::Summarization(
                    "Provider returned an empty section".to_string(),
                )),
                Err(e @ AppError::Cancelled(_)) => return Err(e),
                Err(e) => Err(AppError::Summarization(format!(
                    "Section synthesis failed: {}",
                    e
                ))),
            };

            let (body, degraded) = match synthesized {
                Ok(body) => (body, false),
                Err(err) => {
                    warn!(session_id = %scope.session_id, section = n, "{}", err);
                    scope.error(Stage::Summarization, &err);
                    (draft.findings_dump(), true)
                }
            };

            sections.push(ReportSection {
                sub_query_id: draft.sub_query.id,
                heading: draft.sub_query.text.clone(),
                body,
                confidence: draft.confidence(),
                corroborated: draft.corroborated(),
                disputed: draft.disputed(),
                citations: draft.citations(),
                degraded,
            });
        }

        let confidence = overall_confidence(&sections);
        let degraded = sections.is_empty() || sections.iter().any(|s| s.degraded);
        scope.emit(
            Stage::Summarization,
            EventKind::Result,
            format!(
                "Report ready: {} sections, {} citations{}",
                sections.len(),
                citations.len(),
                if degraded { " (degraded)" } else { "" }
            ),
            Some(confidence),
        );

        Ok(Report {
            session_id: scope.session_id,
            query: query.to_string(),
            sections,
            citations,
            confidence,
            degraded,
            generated_at: Utc::now(),
        })
    }
}

/// Group findings by sub-query in plan order and resolve citations.
fn draft_sections<'a>(
    plan: &'a ResearchPlan,
    findings: &'a [Finding],
    verdicts: &[ValidationVerdict],
) -> (Vec<SectionDraft<'a>>, Vec<Citation>) {
    let by_finding: HashMap<usize, &ValidationVerdict> =
        verdicts.iter().map(|v| (v.finding_id, v)).collect();
    let mut index = CitationIndex::default();

    let drafts = plan
        .sub_queries
        .iter()
        .filter_map(|sub_query| {
            let entries: Vec<Entry<'a>> = findings
                .iter()
                .filter(|f| f.sub_query_id == sub_query.id)
                .map(|finding| {
                    let (status, confidence) = by_finding
                        .get(&finding.id)
                        .map(|v| (v.status, v.confidence))
                        .unwrap_or((VerdictStatus::Unverifiable, finding.confidence));
                    let citations = if status == VerdictStatus::Contradicted {
                        Vec::new()
                    } else {
                        finding.sources.iter().map(|s| index.cite(s)).collect()
                    };
                    Entry {
                        finding,
                        status,
                        confidence,
                        citations,
                    }
                })
                .collect();
            if entries.is_empty() {
                None
            } else {
                Some(SectionDraft { sub_query, entries })
            }
        })
        .collect();

    (drafts, index.citations)
}

/// Section confidences weighted by corroborated findings, or their plain mean
/// when nothing was corroborated.
fn overall_confidence(sections: &[ReportSection]) -> f32 {
    let weight: usize = sections.iter().map(|s| s.corroborated).sum();
    if weight == 0 {
        let values: Vec<f32> = sections.iter().map(|s| s.confidence).collect();
        return mean(&values);
    }
    sections
        .iter()
        .map(|s| s.confidence * s.corroborated as f32)
        .sum::<f32>()
        / weight as f32
}
