//! API request handlers.
//!
//! This module contains all HTTP request handlers organized by functionality.

/// Liveness endpoint.
pub mod health;
/// Session lifecycle, report and event-stream handlers.
pub mod research;
/// Per-user session listing.
pub mod sessions;
