//! Shared helpers for the integration tests.

#![allow(dead_code)]

pub mod mocks;

use quest::{Orchestrator, QuestConfig};
use std::sync::Arc;

use mocks::MockSearchProvider;

/// Configuration for fast, deterministic tests: no retries, short timeouts.
pub fn test_config() -> QuestConfig {
    let mut config = QuestConfig::default();
    config.research.retry_count = 0;
    config.research.retry_base_delay_ms = 1;
    config.research.call_timeout_secs = 5;
    config.research.session_timeout_secs = 30;
    config
}

pub fn orchestrator_with(
    provider: MockSearchProvider,
    config: QuestConfig,
) -> (Arc<Orchestrator>, Arc<MockSearchProvider>) {
    let provider = Arc::new(provider);
    let orchestrator = Arc::new(Orchestrator::new(provider.clone(), config));
    (orchestrator, provider)
}
