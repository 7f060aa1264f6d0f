use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============= Session Types =============

/// Lifecycle state of a research session.
///
/// The happy path is strictly forward:
/// `Created → Planning → Researching → Validating → Summarizing → Completed`.
/// `Failed` and `Cancelled` are reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Planning,
    Researching,
    Validating,
    Summarizing,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    /// Whether the session can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    /// Position on the forward path, used to forbid revisiting a state.
    fn rank(self) -> u8 {
        match self {
            SessionStatus::Created => 0,
            SessionStatus::Planning => 1,
            SessionStatus::Researching => 2,
            SessionStatus::Validating => 3,
            SessionStatus::Summarizing => 4,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled => 5,
        }
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            SessionStatus::Failed | SessionStatus::Cancelled => true,
            SessionStatus::Created => false,
            _ => next.rank() == self.rank() + 1,
        }
    }

    /// The stage doing work while the session is in this state.
    pub fn stage(self) -> Option<Stage> {
        match self {
            SessionStatus::Planning => Some(Stage::Planning),
            SessionStatus::Researching => Some(Stage::Research),
            SessionStatus::Validating => Some(Stage::Validation),
            SessionStatus::Summarizing => Some(Stage::Summarization),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::Planning => "planning",
            SessionStatus::Researching => "researching",
            SessionStatus::Validating => "validating",
            SessionStatus::Summarizing => "summarizing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline component that produced an event or a stage result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Orchestrator,
    Planning,
    Research,
    Validation,
    Summarization,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Orchestrator => "orchestrator",
            Stage::Planning => "planning",
            Stage::Research => "research",
            Stage::Validation => "validation",
            Stage::Summarization => "summarization",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How thoroughly each sub-query is researched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchDepth {
    Quick,
    #[default]
    Standard,
    Deep,
    Comprehensive,
}

impl ResearchDepth {
    /// Maximum results requested from the provider per sub-query.
    pub fn max_results(self) -> usize {
        match self {
            ResearchDepth::Quick => 3,
            ResearchDepth::Standard => 5,
            ResearchDepth::Deep => 8,
            ResearchDepth::Comprehensive => 10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResearchDepth::Quick => "quick",
            ResearchDepth::Standard => "standard",
            ResearchDepth::Deep => "deep",
            ResearchDepth::Comprehensive => "comprehensive",
        }
    }
}

/// Caller-supplied constraints for a research session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchOptions {
    /// Subject-area hint passed to the planner (e.g. "economics").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Desired number of sub-queries. Can only lower the configured cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breadth: Option<usize>,
    #[serde(default)]
    pub depth: ResearchDepth,
    /// Owning user reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Record of one finished pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageResult {
    pub stage: Stage,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Number of items the stage produced (sub-queries, findings, verdicts, sections).
    pub items: usize,
    pub summary: String,
}

/// One research request and everything computed for it.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub query: String,
    pub options: ResearchOptions,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub stage_results: Vec<StageResult>,
    /// Confidence after the most recent completed stage.
    pub confidence: f32,
    pub plan: Option<ResearchPlan>,
    pub findings: Vec<Finding>,
    pub verdicts: Vec<ValidationVerdict>,
    pub report: Option<Report>,
    pub last_error: Option<AppError>,
}

impl Session {
    pub fn new(query: impl Into<String>, options: ResearchOptions) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            options,
            status: SessionStatus::Created,
            created_at: now,
            updated_at: now,
            stage_results: Vec::new(),
            confidence: 0.0,
            plan: None,
            findings: Vec::new(),
            verdicts: Vec::new(),
            report: None,
            last_error: None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.options.user_id.as_deref()
    }
}

/// Read-only snapshot returned by `get_status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionStatusView {
    pub session_id: Uuid,
    pub query: String,
    pub status: SessionStatus,
    pub stage: Option<Stage>,
    /// Sequence number of the latest event, 0 when none has been emitted.
    pub last_sequence: u64,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

// ============= Planning Types =============

/// One decomposed question derived from the root query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubQuery {
    /// Position in the plan; findings refer to sub-queries by this id.
    pub id: usize,
    pub text: String,
    pub rationale: String,
    /// Priority weight in `[0, 1]`, higher is more important.
    pub priority: f32,
}

/// Ordered decomposition of a root query. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchPlan {
    pub strategy: String,
    pub sub_queries: Vec<SubQuery>,
    /// Follow-up questions suggested by the provider, not researched.
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
}

impl ResearchPlan {
    pub fn is_empty(&self) -> bool {
        self.sub_queries.is_empty()
    }
}

// ============= Research Types =============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    /// Authority score in `[0, 1]`.
    pub authority: f32,
}

/// One extracted claim plus its sources from a single sub-query's search call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub id: usize,
    pub sub_query_id: usize,
    pub claim: String,
    pub sources: Vec<Source>,
    /// Raw confidence reported for the search call.
    pub confidence: f32,
    /// Provider-reported relevance, used for ordering within a sub-query.
    pub relevance: f32,
}

// ============= Validation Types =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Corroborated,
    Contradicted,
    Unverifiable,
}

/// Per-finding judgment produced by the validation stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationVerdict {
    pub finding_id: usize,
    pub status: VerdictStatus,
    pub supporting: Vec<usize>,
    pub conflicting: Vec<usize>,
    /// Adjusted confidence.
    pub confidence: f32,
    /// Set when a comparison call failed and the verdict is incomplete.
    #[serde(default)]
    pub degraded: bool,
}

// ============= Report Types =============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    /// 1-based index used by `[n]` markers in section bodies.
    pub index: usize,
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportSection {
    pub sub_query_id: usize,
    pub heading: String,
    pub body: String,
    pub confidence: f32,
    pub corroborated: usize,
    /// Finding ids whose verdict is `contradicted`, surfaced for the reader.
    pub disputed: Vec<usize>,
    /// Citation indices referenced by this section.
    pub citations: Vec<usize>,
    /// True when the body is a local findings dump instead of synthesized prose.
    pub degraded: bool,
}

/// Final synthesized document for a completed session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub session_id: Uuid,
    pub query: String,
    pub sections: Vec<ReportSection>,
    pub citations: Vec<Citation>,
    pub confidence: f32,
    pub degraded: bool,
    pub generated_at: DateTime<Utc>,
}

// ============= Event Types =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Thinking,
    Progress,
    Result,
    Error,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Thinking => "thinking",
            EventKind::Progress => "progress",
            EventKind::Result => "result",
            EventKind::Error => "error",
        }
    }
}

/// A unit on the live event stream. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentEvent {
    pub session_id: Uuid,
    /// Strictly increasing and gapless from 1 within a session.
    pub sequence: u64,
    pub stage: Stage,
    pub kind: EventKind,
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub timestamp: DateTime<Utc>,
}

// ============= API Request/Response Types =============

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResearchRequest {
    pub query: String,
    #[serde(flatten)]
    pub options: ResearchOptions,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResearchResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
}

/// Serializable form of an [`AppError`]: the taxonomy name plus its message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub kind: String,
    pub error: String,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        Self {
            kind: err.kind().to_string(),
            error: err.to_string(),
        }
    }
}

// ============= Error Types =============

/// Whether a provider failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderErrorKind {
    Transient,
    Permanent,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Provider error ({kind:?}): {message}")]
    Provider {
        kind: ProviderErrorKind,
        message: String,
    },

    #[error("Planning failed: {0}")]
    Planning(String),

    #[error("Research exhausted: {0}")]
    ResearchExhausted(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Summarization error: {0}")]
    Summarization(String),

    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn transient(message: impl Into<String>) -> Self {
        AppError::Provider {
            kind: ProviderErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        AppError::Provider {
            kind: ProviderErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// Only transient provider failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Provider {
                kind: ProviderErrorKind::Transient,
                ..
            }
        )
    }

    /// Taxonomy name of this error.
    ///
    /// `TimeoutError` is the session budget only. A provider call that runs
    /// out of time is a transient `ProviderError`.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "InvalidInputError",
            AppError::Provider { .. } => "ProviderError",
            AppError::Planning(_) => "PlanningError",
            AppError::ResearchExhausted(_) => "ResearchExhaustedError",
            AppError::Validation(_) => "ValidationError",
            AppError::Summarization(_) => "SummarizationError",
            AppError::Capacity(_) => "CapacityError",
            AppError::NotFound(_) => "NotFoundError",
            AppError::NotReady(_) => "NotReadyError",
            AppError::Timeout(_) => "TimeoutError",
            AppError::Cancelled(_) => "CancelledError",
            AppError::Configuration(_) => "ConfigurationError",
            AppError::Internal(_) => "InternalError",
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NotReady(_) | AppError::Cancelled(_) => StatusCode::CONFLICT,
            AppError::Capacity(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Provider { .. } => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Planning(_)
            | AppError::ResearchExhausted(_)
            | AppError::Validation(_)
            | AppError::Summarization(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Configuration(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, axum::Json(ErrorBody::from(&self))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
