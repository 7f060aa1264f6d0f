//! HTTP API Handlers and Routes
//!
//! This module provides the REST API layer for the research orchestrator,
//! built on the Axum web framework.
//!
//! # Module Structure
//!
//! - [`api::handlers`](crate::api::handlers) - Request handlers for each endpoint
//! - [`api::routes`](crate::api::routes) - Route definitions and router configuration
//!
//! # API Endpoints
//!
//! ## Research (`/research`)
//! - `POST /research` - Start a session, returns `202` with the session id
//! - `GET /research/{id}` - Session status
//! - `DELETE /research/{id}` - Cancel a session
//! - `GET /research/{id}/report` - Final report (`409` until completed)
//! - `GET /research/{id}/events` - Server-Sent Events stream of agent events
//!
//! ## Sessions (`/sessions`)
//! - `GET /sessions?user=<id>` - A user's sessions, newest first
//!
//! ## Health (`/health`)
//! - `GET /health` - Health check endpoint
//!
//! # Errors
//!
//! Failures are returned as `{"kind": "<taxonomy name>", "error": "<message>"}`
//! with a status code derived from the error kind.

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;
