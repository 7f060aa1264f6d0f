//! # quest - Multi-Agent Research Orchestrator
//!
//! Decomposes a research question into sub-queries, runs them concurrently
//! against a web-search-capable reasoning API, cross-validates the findings
//! and synthesizes a cited report, streaming the agents' "thoughts" to
//! observers while it works.
//!
//! ## Overview
//!
//! quest can be used in two ways:
//!
//! 1. **As a standalone server** - Run the `quest-server` binary
//! 2. **As a library** - Embed the [`Orchestrator`] in your own Rust project
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use quest::{HttpSearchProvider, Orchestrator, QuestConfig};
//! use quest::types::ResearchOptions;
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> quest::Result<()> {
//!     let config = QuestConfig::load_or_default(None)?;
//!     let provider = Arc::new(HttpSearchProvider::from_config(&config)?);
//!     let orchestrator = Orchestrator::new(provider, config);
//!
//!     let id = orchestrator.start("impact of X on Y", ResearchOptions::default())?;
//!     let mut events = orchestrator.subscribe(id)?;
//!     while let Some(event) = events.next().await {
//!         println!("[{}] {}", event.sequence, event.payload);
//!     }
//!
//!     let report = orchestrator.get_report(id)?;
//!     println!("{} sections, confidence {:.2}", report.sections.len(), report.confidence);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Data model and the error taxonomy
//! - [`provider`] - Search provider trait, retry policy and HTTP backend
//! - [`events`] - Per-session event logs and subscriptions
//! - [`research`] - Planning, research, validation and summarization stages
//! - [`orchestrator`] - Session state machine and admission control
//! - [`api`] - REST and Server-Sent Events endpoints
//!
//! ## Pipeline
//!
//! ```text
//! Created → Planning → Researching → Validating → Summarizing → Completed
//!              └───────────┴────────────┴─────────────┴──→ Failed | Cancelled
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// HTTP API handlers and routes.
pub mod api;
/// Command-line parsing and terminal output.
pub mod cli;
/// Session event streams.
pub mod events;
/// Session orchestration.
pub mod orchestrator;
/// Search provider abstraction and backends.
pub mod provider;
/// Research pipeline stages.
pub mod research;
/// Core types (data model, errors).
pub mod types;
/// Configuration utilities.
pub mod utils;

// Re-export commonly used types
pub use events::EventBus;
pub use orchestrator::Orchestrator;
pub use provider::{HttpSearchProvider, ResearchModel, SearchProvider};
pub use types::{AppError, Result};
pub use utils::toml_config::QuestConfig;

use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// The session orchestrator
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}
