use crate::api::handlers::{health, research, sessions};
use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/research", post(research::start_research))
        .route(
            "/research/{id}",
            get(research::get_status).delete(research::cancel_research),
        )
        .route("/research/{id}/report", get(research::get_report))
        .route("/research/{id}/events", get(research::stream_events))
        .route("/sessions", get(sessions::list_sessions))
}

/// The full application: routes, request tracing and permissive CORS.
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    create_router()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
