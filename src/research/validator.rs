use super::{excerpt, StageScope};
use crate::provider::authority::source_host;
use crate::provider::{extract_json, ResearchModel, SearchOptions};
use crate::types::{AppError, EventKind, Finding, Result, Stage, ValidationVerdict, VerdictStatus};
use crate::utils::toml_config::ValidationConfig;
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use tracing::warn;

const VALIDATION_SYSTEM_PROMPT: &str = r#"You are a fact checker. Compare the finding under review with each numbered finding.
For each one give a semantic similarity between 0 and 1 (do the two claims talk about the same fact?) and whether the two claims are mutually exclusive.

Respond with JSON only:
{"comparisons": [{"index": <number>, "similarity": <0.0-1.0>, "contradicts": <true|false>}]}"#;

/// Contradicted findings keep exactly half their raw confidence.
const CONTRADICTION_FACTOR: f32 = 0.5;

#[derive(Debug, Clone, Deserialize)]
struct Comparison {
    index: usize,
    #[serde(default)]
    similarity: f32,
    #[serde(default)]
    contradicts: bool,
}

/// Disjoint-set forest over finding ids.
struct Groups {
    parent: Vec<usize>,
}

impl Groups {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

/// Cross-checks findings against each other and derives one verdict per finding.
///
/// Each finding is compared with every later finding in a single provider
/// call; that call is the stage's cancellation checkpoint. Pairs whose
/// similarity reaches the threshold, or which are flagged as contradictory,
/// join the same group. Within a group:
///
/// - a finding with a contradicting peer is `contradicted` (confidence halved),
/// - a finding with agreeing peers whose sources span at least two hosts is
///   `corroborated` (`min(1, max_authority · (1 + boost)^k)`),
/// - anything else is `unverifiable` and keeps its raw confidence.
///
/// A failed comparison call never fails the stage. Findings left without any
/// peer because of it are `unverifiable`, penalized and marked degraded.
pub struct ValidationStage {
    similarity_threshold: f32,
    corroboration_boost: f32,
    degraded_penalty: f32,
}

impl ValidationStage {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            similarity_threshold: config.similarity_threshold,
            corroboration_boost: config.corroboration_boost,
            degraded_penalty: config.degraded_penalty,
        }
    }

    pub async fn run(
        &self,
        scope: &StageScope,
        findings: &[Finding],
    ) -> Result<Vec<ValidationVerdict>> {
        let n = findings.len();
        let mut groups = Groups::new(n);
        let mut conflicts: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        let mut unchecked = vec![false; n];

        for i in 0..n.saturating_sub(1) {
            scope.check_cancelled()?;
            scope.thinking(
                Stage::Validation,
                format!(
                    "Cross-checking finding {} of {} against {} later findings",
                    i + 1,
                    n,
                    n - i - 1
                ),
            );

            match self.compare(scope, findings, i).await {
                Ok(comparisons) => {
                    for c in comparisons {
                        if c.index <= i || c.index >= n {
                            continue;
                        }
                        if c.contradicts {
                            conflicts[i].insert(c.index);
                            conflicts[c.index].insert(i);
                            groups.union(i, c.index);
                        } else if c.similarity >= self.similarity_threshold {
                            groups.union(i, c.index);
                        }
                    }
                }
                Err(e @ AppError::Cancelled(_)) => return Err(e),
                Err(e) => {
                    let err = AppError::Validation(format!(
                        "Comparison for finding {} failed: {}",
                        i, e
                    ));
                    warn!(session_id = %scope.session_id, finding = i, "{}", err);
                    scope.error(Stage::Validation, &err);
                    for flag in &mut unchecked[i..] {
                        *flag = true;
                    }
                }
            }
        }
        scope.check_cancelled()?;

        let roots: Vec<usize> = (0..n).map(|i| groups.find(i)).collect();
        let verdicts: Vec<ValidationVerdict> = (0..n)
            .map(|i| {
                let peers: Vec<usize> = (0..n)
                    .filter(|&j| j != i && roots[j] == roots[i])
                    .collect();
                self.verdict_for(findings, i, &peers, &conflicts[i], unchecked[i])
            })
            .collect();

        let count = |status: VerdictStatus| {
            verdicts.iter().filter(|v| v.status == status).count()
        };
        let mean = verdicts.iter().map(|v| v.confidence).sum::<f32>() / n.max(1) as f32;
        scope.emit(
            Stage::Validation,
            EventKind::Result,
            format!(
                "{} corroborated, {} contradicted, {} unverifiable",
                count(VerdictStatus::Corroborated),
                count(VerdictStatus::Contradicted),
                count(VerdictStatus::Unverifiable)
            ),
            Some(mean),
        );

        Ok(verdicts)
    }

    async fn compare(
        &self,
        scope: &StageScope,
        findings: &[Finding],
        i: usize,
    ) -> Result<Vec<Comparison>> {
        let mut prompt = format!(
            "Finding under review:\n[{}] {}\n\nCompare it with:\n",
            i, findings[i].claim
        );
        for (j, other) in findings.iter().enumerate().skip(i + 1) {
            prompt.push_str(&format!("[{}] {}\n", j, other.claim));
        }

        let options = SearchOptions::default().with_system_prompt(VALIDATION_SYSTEM_PROMPT);
        let response = scope
            .call(&prompt, ResearchModel::Validation, &options)
            .await?;

        extract_json(&response.content)
            .and_then(|v| v.get("comparisons").cloned())
            .and_then(|c| serde_json::from_value::<Vec<Comparison>>(c).ok())
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Unparseable comparison response: {}",
                    excerpt(&response.content, 120)
                ))
            })
    }

    fn verdict_for(
        &self,
        findings: &[Finding],
        i: usize,
        peers: &[usize],
        conflicts: &BTreeSet<usize>,
        unchecked: bool,
    ) -> ValidationVerdict {
        let finding = &findings[i];
        let supporting: Vec<usize> = peers
            .iter()
            .copied()
            .filter(|j| !conflicts.contains(j))
            .collect();
        let conflicting: Vec<usize> = conflicts.iter().copied().collect();

        let (status, confidence, degraded) = if !conflicting.is_empty() {
            (
                VerdictStatus::Contradicted,
                finding.confidence * CONTRADICTION_FACTOR,
                false,
            )
        } else if !supporting.is_empty() && independent_hosts(findings, i, &supporting) >= 2 {
            let max_authority = std::iter::once(i)
                .chain(supporting.iter().copied())
                .flat_map(|j| findings[j].sources.iter().map(|s| s.authority))
                .fold(0.0f32, f32::max);
            let boost = (1.0 + self.corroboration_boost).powi(supporting.len() as i32);
            (
                VerdictStatus::Corroborated,
                (max_authority * boost).min(1.0),
                false,
            )
        } else if supporting.is_empty() && unchecked {
            (
                VerdictStatus::Unverifiable,
                finding.confidence * self.degraded_penalty,
                true,
            )
        } else {
            (VerdictStatus::Unverifiable, finding.confidence, false)
        };

        ValidationVerdict {
            finding_id: finding.id,
            status,
            supporting: supporting.iter().map(|&j| findings[j].id).collect(),
            conflicting: conflicting.iter().map(|&j| findings[j].id).collect(),
            confidence,
            degraded,
        }
    }
}

/// Distinct source hosts across a finding and its supporters.
fn independent_hosts(findings: &[Finding], i: usize, supporting: &[usize]) -> usize {
    std::iter::once(i)
        .chain(supporting.iter().copied())
        .flat_map(|j| findings[j].sources.iter())
        .map(|s| source_host(&s.url))
        .collect::<HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::types::Source;
    use std::sync::Arc;

    fn finding(id: usize, url: &str, authority: f32, confidence: f32) -> Finding {
        Finding {
            id,
            sub_query_id: 0,
            claim: format!("claim {}", id),
            sources: vec![Source {
                url: url.to_string(),
                title: url.to_string(),
                snippet: String::new(),
                authority,
            }],
            confidence,
            relevance: 1.0,
        }
    }

    fn stage() -> ValidationStage {
        ValidationStage::new(&ValidationConfig::default())
    }

    #[test]
    fn test_groups_are_transitive() {
        let mut groups = Groups::new(4);
        groups.union(0, 1);
        groups.union(1, 3);
        assert_eq!(groups.find(0), groups.find(3));
        assert_ne!(groups.find(0), groups.find(2));
    }

    #[tokio::test]
    async fn test_corroboration_contradiction_and_isolation() {
        let findings = vec![
            finding(0, "https://census.gov/a", 0.95, 0.6),
            finding(1, "https://example.com/b", 0.5, 0.7),
            finding(2, "https://blog.example.net/c", 0.5, 0.8),
            finding(3, "https://other.org/d", 0.7, 0.4),
        ];
        let provider = Arc::new(ScriptedProvider::new(vec![
            text(r#"{"comparisons": [{"index": 1, "similarity": 0.9}, {"index": 2, "similarity": 0.1}, {"index": 3, "similarity": 0.2}]}"#),
            text(r#"{"comparisons": [{"index": 2, "similarity": 0.3}, {"index": 3, "similarity": 0.2}]}"#),
            text(r#"{"comparisons": [{"index": 3, "similarity": 0.8, "contradicts": true}]}"#),
        ]));
        let scope = scope(provider.clone());

        let verdicts = stage().run(&scope, &findings).await.unwrap();

        assert_eq!(provider.call_count(), 3);
        assert_eq!(verdicts.len(), 4);

        assert_eq!(verdicts[0].status, VerdictStatus::Corroborated);
        assert_eq!(verdicts[0].supporting, vec![1]);
        assert!((verdicts[0].confidence - (0.95f32 * 1.1).min(1.0)).abs() < 1e-6);

        assert_eq!(verdicts[2].status, VerdictStatus::Contradicted);
        assert_eq!(verdicts[2].conflicting, vec![3]);
        assert_eq!(verdicts[2].confidence, 0.8 * 0.5);
        assert_eq!(verdicts[3].status, VerdictStatus::Contradicted);
        assert_eq!(verdicts[3].confidence, 0.4 * 0.5);
    }

    #[tokio::test]
    async fn test_same_host_is_not_independent() {
        let findings = vec![
            finding(0, "https://www.example.com/a", 0.5, 0.6),
            finding(1, "https://example.com/b", 0.5, 0.7),
        ];
        let provider = Arc::new(ScriptedProvider::new(vec![text(
            r#"{"comparisons": [{"index": 1, "similarity": 0.99}]}"#,
        )]));
        let scope = scope(provider);

        let verdicts = stage().run(&scope, &findings).await.unwrap();

        assert_eq!(verdicts[0].status, VerdictStatus::Unverifiable);
        assert_eq!(verdicts[0].confidence, 0.6);
        assert_eq!(verdicts[0].supporting, vec![1]);
    }

    #[tokio::test]
    async fn test_failed_comparison_degrades_isolated_findings() {
        let findings = vec![
            finding(0, "https://a.org/x", 0.7, 0.5),
            finding(1, "https://b.org/y", 0.7, 0.9),
        ];
        let provider = Arc::new(ScriptedProvider::new(vec![Err(AppError::permanent("down"))]));
        let scope = scope(provider);

        let verdicts = stage().run(&scope, &findings).await.unwrap();

        assert!(verdicts.iter().all(|v| v.degraded));
        assert!(verdicts.iter().all(|v| v.status == VerdictStatus::Unverifiable));
        assert!((verdicts[1].confidence - 0.9 * 0.8).abs() < 1e-6);

        let events = scope.ctx.events.events(scope.session_id);
        assert!(events
            .iter()
            .any(|e| e.kind == EventKind::Error && e.payload.starts_with("ValidationError")));
    }

    #[tokio::test]
    async fn test_single_finding_needs_no_call() {
        let provider = Arc::new(ScriptedProvider::default());
        let scope = scope(provider.clone());

        let verdicts = stage()
            .run(&scope, &[finding(0, "https://a.org", 0.7, 0.3)])
            .await
            .unwrap();

        assert_eq!(provider.call_count(), 0);
        assert_eq!(verdicts[0].status, VerdictStatus::Unverifiable);
        assert_eq!(verdicts[0].confidence, 0.3);
        assert!(!verdicts[0].degraded);
    }

    #[tokio::test]
    async fn test_cancel_stops_at_verdict_boundary() {
        let provider = Arc::new(ScriptedProvider::default());
        let scope = scope(provider.clone());
        scope.cancel.cancel();

        let findings = vec![
            finding(0, "https://a.org", 0.7, 0.3),
            finding(1, "https://b.org", 0.7, 0.3),
        ];
        let err = stage().run(&scope, &findings).await.unwrap_err();

        assert!(matches!(err, AppError::Cancelled(_)));
        assert_eq!(provider.call_count(), 0);
    }
}
