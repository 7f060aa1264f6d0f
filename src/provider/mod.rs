//! Search Provider Abstractions
//!
//! The provider is the orchestrator's only I/O boundary: a query → results
//! call with model selection by pipeline phase.
//!
//! # Architecture
//!
//! - [`SearchProvider`] - The capability trait every backend implements
//! - [`ResearchModel`] - Phase enum mapped to upstream model ids by the config's model table
//! - [`retry::call_provider`] - Timeout + exponential-backoff retry wrapper used by every stage
//! - [`http::HttpSearchProvider`] - OpenAI-compatible HTTP backend
//! - [`authority`] - Source authority and confidence heuristics
//!
//! # Example
//!
//! ```ignore
//! use quest::provider::{HttpSearchProvider, ResearchModel, SearchOptions, SearchProvider};
//!
//! let provider = HttpSearchProvider::from_config(&config)?;
//! let response = provider
//!     .search("state of solid-state batteries", ResearchModel::Deep, &SearchOptions::default())
//!     .await?;
//! println!("{} claims", response.claims.len());
//! ```

/// Source authority and confidence heuristics.
pub mod authority;
/// Core provider trait and request/response types.
pub mod client;
/// HTTP backend for OpenAI-compatible APIs.
pub mod http;
/// Timeout and retry policy.
pub mod retry;

pub use client::{
    extract_json, Claim, ResearchModel, SearchOptions, SearchProvider, SearchResponse,
};
pub use http::HttpSearchProvider;
pub use retry::{call_provider, call_provider_gated, RetryPolicy};
