use crate::types::{AppError, Result, Session, SessionStatus};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A session record plus the token its pipeline task watches.
///
/// Only the orchestrator writes the record; everyone else gets clones.
pub struct SessionHandle {
    pub(crate) session: RwLock<Session>,
    pub(crate) cancel: CancellationToken,
}

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        Self {
            session: RwLock::new(session),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.session.read().id
    }

    pub fn status(&self) -> SessionStatus {
        self.session.read().status
    }
}

/// In-memory session registry. Sessions stay here until purged.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<SessionHandle>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: Arc<SessionHandle>) {
        let id = handle.id();
        self.sessions.write().insert(id, handle);
    }

    pub fn get(&self, id: Uuid) -> Result<Arc<SessionHandle>> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))
    }

    pub fn remove(&self, id: Uuid) -> Option<Arc<SessionHandle>> {
        self.sessions.write().remove(&id)
    }

    /// Handles matching `predicate`, in no particular order.
    pub fn filter<F>(&self, predicate: F) -> Vec<Arc<SessionHandle>>
    where
        F: Fn(&Session) -> bool,
    {
        self.sessions
            .read()
            .values()
            .filter(|handle| predicate(&handle.session.read()))
            .cloned()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.read().len()
    }
}
