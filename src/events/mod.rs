//! Agent Event Stream
//!
//! Stage transitions and "agent thoughts" are published to a per-session,
//! append-only log. Observers (the SSE endpoint, the CLI) attach through
//! [`EventBus::subscribe`], which replays the log from the first event and
//! follows it until the session reaches a terminal state.

/// Event log storage and subscriptions.
pub mod bus;

pub use bus::{EventBus, EventStream};
