use crate::types::{AppError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Admission control for new sessions.
///
/// Provider calls beyond the concurrency gates queue; sessions beyond
/// `limit` live ones are rejected up front with [`AppError::Capacity`].
#[derive(Debug, Clone)]
pub struct Admission {
    active: Arc<AtomicUsize>,
    limit: usize,
}

impl Admission {
    pub fn new(limit: usize) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            limit: limit.max(1),
        }
    }

    /// Reserve a slot, released when the returned guard is dropped.
    pub fn try_acquire(&self) -> Result<SessionSlot> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .map_err(|n| {
                AppError::Capacity(format!(
                    "{} sessions already active (limit {})",
                    n, self.limit
                ))
            })?;

        Ok(SessionSlot {
            active: self.active.clone(),
        })
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// A reserved session slot. Held by the session's pipeline task.
#[derive(Debug)]
pub struct SessionSlot {
    active: Arc<AtomicUsize>,
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}
