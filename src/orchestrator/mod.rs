//! Session Orchestration
//!
//! The root component: owns the session records, admits new sessions, and
//! drives each one through `Planning → Researching → Validating →
//! Summarizing → Completed` on its own task.
//!
//! # Guarantees
//!
//! - Transitions only move forward; `Failed` and `Cancelled` are reachable
//!   from any non-terminal state.
//! - Every transition publishes exactly one `progress` event. Stage failures
//!   publish an `error` event before the session moves to `Failed`.
//! - An empty plan or zero findings fails the session.
//! - Each session runs under a wall-clock budget; exceeding it forces `Failed`
//!   with a `TimeoutError`.
//!
//! # Example
//!
//! ```ignore
//! use quest::orchestrator::Orchestrator;
//! use quest::types::ResearchOptions;
//!
//! let orchestrator = Orchestrator::new(provider, config);
//! let id = orchestrator.start("impact of X on Y", ResearchOptions::default())?;
//! let status = orchestrator.wait(id).await?;
//! let report = orchestrator.get_report(id)?;
//! ```

/// Session admission limits.
pub mod admission;
/// The orchestrator and its pipeline task.
pub mod engine;
/// Session records and their registry.
pub mod session;

pub use admission::{Admission, SessionSlot};
pub use engine::Orchestrator;
pub use session::{SessionHandle, SessionStore};
