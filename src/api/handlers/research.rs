use crate::{
    types::{
        Report, Result, SessionStatus, SessionStatusView, StartResearchRequest,
        StartResearchResponse,
    },
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use uuid::Uuid;

/// Start a research session. The pipeline runs in the background.
pub async fn start_research(
    State(state): State<AppState>,
    Json(payload): Json<StartResearchRequest>,
) -> Result<(StatusCode, Json<StartResearchResponse>)> {
    let session_id = state
        .orchestrator
        .start(&payload.query, payload.options)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartResearchResponse {
            session_id,
            status: SessionStatus::Created,
        }),
    ))
}

pub async fn get_status(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionStatusView>> {
    Ok(Json(state.orchestrator.get_status(session_id)?))
}

/// Cancel a session and return its status afterwards.
pub async fn cancel_research(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionStatusView>> {
    state.orchestrator.cancel(session_id)?;
    Ok(Json(state.orchestrator.get_status(session_id)?))
}

pub async fn get_report(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Report>> {
    Ok(Json(state.orchestrator.get_report(session_id)?))
}

/// Server-Sent Events stream of a session's events.
///
/// Replays from sequence 1 and ends when the session is terminal. The SSE
/// `id` is the sequence number and the SSE event name is the event kind.
pub async fn stream_events(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    let events = state.orchestrator.subscribe(session_id)?;

    let stream = events.map(|event| {
        Event::default()
            .id(event.sequence.to_string())
            .event(event.kind.as_str())
            .json_data(&event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
