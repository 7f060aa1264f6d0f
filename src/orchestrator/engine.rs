use super::admission::{Admission, SessionSlot};
use super::session::{SessionHandle, SessionStore};
use crate::events::{EventBus, EventStream};
use crate::provider::SearchProvider;
use crate::research::{
    PlanningStage, ResearchContext, ResearchStage, StageScope, SummarizationStage,
    ValidationStage,
};
use crate::types::{
    AppError, ErrorBody, EventKind, Report, ResearchOptions, Result, Session, SessionStatus,
    SessionStatusView, Stage, StageResult,
};
use crate::utils::toml_config::QuestConfig;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Drives research sessions through the stage pipeline.
///
/// `start` returns as soon as the session is registered; the pipeline runs on
/// its own task. All session state changes go through [`transition`] under the
/// session's write lock, which publishes exactly one `progress` event per
/// transition and closes the event log on terminal states.
pub struct Orchestrator {
    ctx: Arc<ResearchContext>,
    sessions: Arc<SessionStore>,
    admission: Admission,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn SearchProvider>, config: QuestConfig) -> Self {
        let ctx = ResearchContext::new(provider, Arc::new(config), Arc::new(EventBus::new()));
        Self::with_context(Arc::new(ctx))
    }

    pub fn with_context(ctx: Arc<ResearchContext>) -> Self {
        let admission = Admission::new(ctx.config.research.max_active_sessions);
        Self {
            ctx,
            sessions: Arc::new(SessionStore::new()),
            admission,
        }
    }

    pub fn config(&self) -> &QuestConfig {
        &self.ctx.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.ctx.events
    }

    pub fn provider_name(&self) -> &str {
        self.ctx.provider.name()
    }

    /// Sessions whose pipeline task is still running.
    pub fn active_sessions(&self) -> usize {
        self.admission.active()
    }

    /// Most sessions that may run at once.
    pub fn session_limit(&self) -> usize {
        self.admission.limit()
    }

    /// Sessions held in memory, terminal ones included until purged.
    pub fn stored_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Register a session and schedule its pipeline.
    ///
    /// Fails with `InvalidInput` for a blank query or zero breadth and with
    /// `Capacity` when too many sessions are live. Must be called from within
    /// a Tokio runtime.
    pub fn start(&self, query: &str, options: ResearchOptions) -> Result<Uuid> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidInput(
                "Query must not be empty".to_string(),
            ));
        }
        if options.breadth == Some(0) {
            return Err(AppError::InvalidInput(
                "Breadth must be at least 1".to_string(),
            ));
        }

        let slot = self.admission.try_acquire()?;
        let depth = options.depth;
        let session = Session::new(query, options);
        let session_id = session.id;
        let handle = Arc::new(SessionHandle::new(session));

        self.ctx.events.open(session_id);
        self.sessions.insert(handle.clone());

        info!(%session_id, depth = depth.as_str(), "Session created");

        tokio::spawn(run_pipeline(self.ctx.clone(), handle, slot));
        Ok(session_id)
    }

    /// Cancel a session and return its resulting status.
    ///
    /// The transition happens immediately; the pipeline stops at its next
    /// checkpoint and its partial results are discarded. Cancelling a
    /// terminal session is a no-op.
    pub fn cancel(&self, session_id: Uuid) -> Result<SessionStatus> {
        let handle = self.sessions.get(session_id)?;
        let status = {
            let mut session = handle.session.write();
            if transition(
                &self.ctx.events,
                &mut session,
                SessionStatus::Cancelled,
                "cancelled by request",
            ) {
                discard_partial_results(&mut session);
                info!(%session_id, "Session cancelled");
            }
            session.status
        };
        handle.cancel.cancel();
        Ok(status)
    }

    pub fn get_status(&self, session_id: Uuid) -> Result<SessionStatusView> {
        let handle = self.sessions.get(session_id)?;
        let session = handle.session.read();
        Ok(self.status_view(&session))
    }

    /// The report of a completed session.
    ///
    /// Failed sessions return their recorded error, cancelled ones
    /// `Cancelled`, live ones `NotReady`.
    pub fn get_report(&self, session_id: Uuid) -> Result<Report> {
        let handle = self.sessions.get(session_id)?;
        let session = handle.session.read();
        match session.status {
            SessionStatus::Completed => session.report.clone().ok_or_else(|| {
                AppError::Internal(format!("Session {} completed without a report", session_id))
            }),
            SessionStatus::Failed => Err(session.last_error.clone().unwrap_or_else(|| {
                AppError::Internal(format!("Session {} failed", session_id))
            })),
            SessionStatus::Cancelled => Err(AppError::Cancelled(format!(
                "Session {} was cancelled",
                session_id
            ))),
            status => Err(AppError::NotReady(format!(
                "Session {} is {}",
                session_id, status
            ))),
        }
    }

    /// Replay the session's events and follow them until it is terminal.
    pub fn subscribe(&self, session_id: Uuid) -> Result<EventStream> {
        self.sessions.get(session_id)?;
        self.ctx.events.subscribe(session_id)
    }

    /// Wait until the session reaches a terminal state.
    pub async fn wait(&self, session_id: Uuid) -> Result<SessionStatusView> {
        let mut events = self.subscribe(session_id)?;
        while events.next().await.is_some() {}
        self.get_status(session_id)
    }

    /// Status views of one user's sessions, newest first.
    pub fn list_sessions(&self, user_id: &str) -> Vec<SessionStatusView> {
        let mut views: Vec<SessionStatusView> = self
            .sessions
            .filter(|s| s.user_id() == Some(user_id))
            .iter()
            .map(|handle| self.status_view(&handle.session.read()))
            .collect();
        views.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        views
    }

    /// Drop a terminal session and its event log.
    pub fn purge(&self, session_id: Uuid) -> Result<()> {
        let handle = self.sessions.get(session_id)?;
        let status = handle.status();
        if !status.is_terminal() {
            return Err(AppError::InvalidInput(format!(
                "Session {} is {}; only terminal sessions can be purged",
                session_id, status
            )));
        }
        self.sessions.remove(session_id);
        self.ctx.events.remove(session_id);
        info!(%session_id, "Session purged");
        Ok(())
    }

    fn status_view(&self, session: &Session) -> SessionStatusView {
        SessionStatusView {
            session_id: session.id,
            query: session.query.clone(),
            status: session.status,
            stage: session.status.stage(),
            last_sequence: self.ctx.events.last_sequence(session.id),
            confidence: session.confidence,
            created_at: session.created_at,
            updated_at: session.updated_at,
            error: session.last_error.as_ref().map(ErrorBody::from),
        }
    }
}

// ============= State Machine =============

/// Apply `next` if legal, publishing its `progress` event. Returns whether the
/// transition happened.
fn transition(
    events: &EventBus,
    session: &mut Session,
    next: SessionStatus,
    detail: &str,
) -> bool {
    let current = session.status;
    if !current.can_transition_to(next) {
        return false;
    }
    session.status = next;
    session.updated_at = Utc::now();

    let payload = if detail.is_empty() {
        format!("{} → {}", current, next)
    } else {
        format!("{} → {}: {}", current, next, detail)
    };
    events.publish(
        session.id,
        Stage::Orchestrator,
        EventKind::Progress,
        payload,
        Some(session.confidence),
    );
    if next.is_terminal() {
        events.close(session.id);
    }
    true
}

fn discard_partial_results(session: &mut Session) {
    session.plan = None;
    session.findings.clear();
    session.verdicts.clear();
    session.report = None;
}

/// Record the error, then move to `Failed`. No-op on terminal sessions.
fn fail(events: &EventBus, handle: &SessionHandle, err: AppError) {
    let mut session = handle.session.write();
    if session.status.is_terminal() {
        return;
    }
    let stage = session.status.stage().unwrap_or(Stage::Orchestrator);
    events.publish(
        session.id,
        stage,
        EventKind::Error,
        format!("{}: {}", err.kind(), err),
        None,
    );
    error!(session_id = %session.id, stage = %stage, kind = err.kind(), "Session failed: {}", err);
    let detail = err.kind();
    session.last_error = Some(err);
    transition(events, &mut session, SessionStatus::Failed, detail);
}

fn cancelled(session_id: Uuid) -> AppError {
    AppError::Cancelled(format!("Session {} was cancelled", session_id))
}

/// Store a stage's output and advance the session, atomically with respect
/// to `cancel`.
fn advance<F>(
    events: &EventBus,
    handle: &SessionHandle,
    next: SessionStatus,
    result: Option<StageResult>,
    confidence: Option<f32>,
    apply: F,
) -> Result<()>
where
    F: FnOnce(&mut Session),
{
    let mut session = handle.session.write();
    if session.status.is_terminal() {
        return Err(cancelled(session.id));
    }
    apply(&mut session);
    let detail = result
        .as_ref()
        .map(|r| r.summary.clone())
        .unwrap_or_default();
    if let Some(result) = result {
        session.stage_results.push(result);
    }
    if let Some(confidence) = confidence {
        session.confidence = confidence;
    }
    if transition(events, &mut session, next, &detail) {
        Ok(())
    } else {
        Err(AppError::Internal(format!(
            "Illegal transition {} → {}",
            session.status, next
        )))
    }
}

fn stage_result(
    stage: Stage,
    started_at: DateTime<Utc>,
    items: usize,
    summary: String,
) -> StageResult {
    StageResult {
        stage,
        started_at,
        finished_at: Utc::now(),
        items,
        summary,
    }
}

fn mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, count) = values.fold((0.0f32, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

// ============= Pipeline Task =============

async fn run_pipeline(ctx: Arc<ResearchContext>, handle: Arc<SessionHandle>, _slot: SessionSlot) {
    let session_id = handle.id();
    let cancel = handle.cancel.clone();
    let scope = StageScope::new(ctx.clone(), session_id, cancel.clone());
    let budget = ctx.config.research.session_timeout();

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled(session_id)),
        result = timeout(budget, drive(&ctx, &handle, &scope)) => {
            result.unwrap_or_else(|_| {
                Err(AppError::Timeout(format!(
                    "Session exceeded its {}s budget",
                    budget.as_secs()
                )))
            })
        }
    };

    match outcome {
        Ok(()) => info!(%session_id, "Session completed"),
        Err(AppError::Cancelled(_)) => {
            let mut session = handle.session.write();
            if transition(&ctx.events, &mut session, SessionStatus::Cancelled, "") {
                discard_partial_results(&mut session);
            }
        }
        Err(err) => {
            fail(&ctx.events, &handle, err);
            // Stop anything still holding the token.
            cancel.cancel();
        }
    }
}

async fn drive(ctx: &ResearchContext, handle: &SessionHandle, scope: &StageScope) -> Result<()> {
    let events = ctx.events.as_ref();
    let config = ctx.config.as_ref();
    let (query, options) = {
        let session = handle.session.read();
        (session.query.clone(), session.options.clone())
    };

    advance(events, handle, SessionStatus::Planning, None, None, |_| {})?;

    let started = Utc::now();
    let plan = PlanningStage::new(config.research.max_sub_queries)
        .run(scope, &query, &options)
        .await?;
    if plan.is_empty() {
        return Err(AppError::Planning("Empty research plan".to_string()));
    }
    let summary = format!("{} sub-queries planned", plan.sub_queries.len());
    let result = stage_result(Stage::Planning, started, plan.sub_queries.len(), summary);
    let stored = plan.clone();
    advance(
        events,
        handle,
        SessionStatus::Researching,
        Some(result),
        None,
        |s| s.plan = Some(stored),
    )?;

    let started = Utc::now();
    let findings = ResearchStage::new(config.research.session_concurrency)
        .run(scope, &plan, &options)
        .await?;
    if findings.is_empty() {
        return Err(AppError::ResearchExhausted(
            "No findings were produced".to_string(),
        ));
    }
    let summary = format!("{} findings gathered", findings.len());
    let result = stage_result(Stage::Research, started, findings.len(), summary);
    let confidence = mean(findings.iter().map(|f| f.confidence));
    let stored = findings.clone();
    advance(
        events,
        handle,
        SessionStatus::Validating,
        Some(result),
        Some(confidence),
        |s| s.findings = stored,
    )?;

    let started = Utc::now();
    let verdicts = ValidationStage::new(&config.validation)
        .run(scope, &findings)
        .await?;
    let summary = format!("{} verdicts", verdicts.len());
    let result = stage_result(Stage::Validation, started, verdicts.len(), summary);
    let confidence = mean(verdicts.iter().map(|v| v.confidence));
    let stored = verdicts.clone();
    advance(
        events,
        handle,
        SessionStatus::Summarizing,
        Some(result),
        Some(confidence),
        |s| s.verdicts = stored,
    )?;

    let started = Utc::now();
    let report = SummarizationStage::new()
        .run(scope, &query, &plan, &findings, &verdicts)
        .await?;
    if report.degraded {
        warn!(session_id = %scope.session_id, "Report degraded to findings dump in some sections");
    }
    let summary = format!(
        "{} sections, {} citations",
        report.sections.len(),
        report.citations.len()
    );
    let result = stage_result(Stage::Summarization, started, report.sections.len(), summary);
    let confidence = report.confidence;
    advance(
        events,
        handle,
        SessionStatus::Completed,
        Some(result),
        Some(confidence),
        |s| s.report = Some(report),
    )
}
