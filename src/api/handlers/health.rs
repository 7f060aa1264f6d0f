use crate::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub provider: String,
    pub active_sessions: usize,
    pub session_limit: usize,
    pub stored_sessions: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        provider: state.orchestrator.provider_name().to_string(),
        active_sessions: state.orchestrator.active_sessions(),
        session_limit: state.orchestrator.session_limit(),
        stored_sessions: state.orchestrator.stored_sessions(),
    })
}
