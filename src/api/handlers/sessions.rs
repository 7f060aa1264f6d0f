use crate::{types::SessionStatusView, AppState};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    pub user: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionStatusView>,
}

/// A user's sessions, newest first.
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<ListSessionsQuery>,
) -> Json<ListSessionsResponse> {
    Json(ListSessionsResponse {
        sessions: state.orchestrator.list_sessions(&params.user),
    })
}
