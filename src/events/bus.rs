use crate::types::{AgentEvent, AppError, EventKind, Result, Stage};
use chrono::Utc;
use futures::Stream;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

/// Boxed stream handed to subscribers.
pub type EventStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send>>;

#[derive(Default)]
struct LogState {
    events: Vec<AgentEvent>,
    closed: bool,
}

/// Append-only event log of one session.
///
/// Appends are serialized by the mutex, which is what makes sequence
/// numbers gapless. The watch channel only carries "something changed".
struct SessionLog {
    session_id: Uuid,
    state: Mutex<LogState>,
    changed: watch::Sender<u64>,
}

impl SessionLog {
    fn new(session_id: Uuid) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            session_id,
            state: Mutex::new(LogState::default()),
            changed,
        }
    }

    fn append(
        &self,
        stage: Stage,
        kind: EventKind,
        payload: String,
        confidence: Option<f32>,
    ) -> Option<AgentEvent> {
        let event = {
            let mut state = self.state.lock();
            if state.closed {
                return None;
            }
            let event = AgentEvent {
                session_id: self.session_id,
                sequence: state.events.len() as u64 + 1,
                stage,
                kind,
                payload,
                confidence,
                timestamp: Utc::now(),
            };
            state.events.push(event.clone());
            event
        };

        self.changed.send_replace(event.sequence);
        debug!(
            session_id = %event.session_id,
            sequence = event.sequence,
            stage = %event.stage,
            kind = ?event.kind,
            "{}",
            event.payload
        );
        Some(event)
    }

    fn close(&self) {
        let last = {
            let mut state = self.state.lock();
            state.closed = true;
            state.events.len() as u64
        };
        self.changed.send_replace(last);
    }

    /// Events from `cursor` on, and whether the log was closed at that moment.
    fn read_from(&self, cursor: usize) -> (Vec<AgentEvent>, bool) {
        let state = self.state.lock();
        let batch = state.events.get(cursor..).map(<[_]>::to_vec).unwrap_or_default();
        (batch, state.closed)
    }
}

/// Publish/subscribe hub for session events.
///
/// Different sessions' logs are independent, so their streams interleave
/// freely; within one session events are totally ordered by sequence number.
#[derive(Default)]
pub struct EventBus {
    logs: RwLock<HashMap<Uuid, Arc<SessionLog>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the log for a session. Opening an existing log is a no-op.
    pub fn open(&self, session_id: Uuid) {
        self.logs
            .write()
            .entry(session_id)
            .or_insert_with(|| Arc::new(SessionLog::new(session_id)));
    }

    fn log(&self, session_id: Uuid) -> Option<Arc<SessionLog>> {
        self.logs.read().get(&session_id).cloned()
    }

    /// Append an event. Returns `None` when the session is unknown or its log
    /// is already closed (the session reached a terminal state).
    pub fn publish(
        &self,
        session_id: Uuid,
        stage: Stage,
        kind: EventKind,
        payload: impl Into<String>,
        confidence: Option<f32>,
    ) -> Option<AgentEvent> {
        self.log(session_id)?
            .append(stage, kind, payload.into(), confidence)
    }

    /// Mark the session's log complete; subscribers drain and finish.
    pub fn close(&self, session_id: Uuid) {
        if let Some(log) = self.log(session_id) {
            log.close();
        }
    }

    /// Drop a session's log entirely.
    pub fn remove(&self, session_id: Uuid) {
        if let Some(log) = self.logs.write().remove(&session_id) {
            log.close();
        }
    }

    /// Sequence number of the latest event, 0 if none.
    pub fn last_sequence(&self, session_id: Uuid) -> u64 {
        self.log(session_id)
            .map(|log| log.state.lock().events.len() as u64)
            .unwrap_or(0)
    }

    /// Snapshot of everything published so far.
    pub fn events(&self, session_id: Uuid) -> Vec<AgentEvent> {
        self.log(session_id)
            .map(|log| log.read_from(0).0)
            .unwrap_or_default()
    }

    /// Subscribe to a session's events from sequence 1.
    ///
    /// Every call starts a fresh replay, so subscriptions are restartable.
    /// The stream ends once the log is closed and fully delivered; dropping
    /// it has no effect on the session.
    pub fn subscribe(&self, session_id: Uuid) -> Result<EventStream> {
        let log = self
            .log(session_id)
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))?;
        let mut changed = log.changed.subscribe();

        let stream = async_stream::stream! {
            let mut cursor = 0usize;
            loop {
                changed.borrow_and_update();
                let (batch, closed) = log.read_from(cursor);
                cursor += batch.len();
                for event in batch {
                    yield event;
                }
                if closed {
                    break;
                }
                if changed.changed().await.is_err() {
                    break;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    #[test]
    fn test_sequence_numbers_are_gapless() {
        let bus = EventBus::new();
        let id = Uuid::new_v4();
        bus.open(id);

        for i in 0..5 {
            let event = bus
                .publish(id, Stage::Research, EventKind::Thinking, format!("t{}", i), None)
                .unwrap();
            assert_eq!(event.sequence, i + 1);
        }
        assert_eq!(bus.last_sequence(id), 5);
    }

    #[test]
    fn test_closed_log_rejects_appends() {
        let bus = EventBus::new();
        let id = Uuid::new_v4();
        bus.open(id);
        bus.publish(id, Stage::Orchestrator, EventKind::Progress, "a", None);
        bus.close(id);

        assert!(bus
            .publish(id, Stage::Orchestrator, EventKind::Progress, "b", None)
            .is_none());
        assert_eq!(bus.last_sequence(id), 1);
    }

    #[test]
    fn test_unknown_session() {
        let bus = EventBus::new();
        let id = Uuid::new_v4();

        assert!(bus
            .publish(id, Stage::Planning, EventKind::Thinking, "x", None)
            .is_none());
        assert!(matches!(bus.subscribe(id), Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_subscription_replays_then_follows() {
        let bus = Arc::new(EventBus::new());
        let id = Uuid::new_v4();
        bus.open(id);
        bus.publish(id, Stage::Planning, EventKind::Thinking, "before", None);

        let stream = bus.subscribe(id).unwrap();

        let publisher = {
            let bus = bus.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                bus.publish(id, Stage::Research, EventKind::Result, "after", Some(0.8));
                bus.close(id);
            })
        };

        let events: Vec<AgentEvent> = stream.collect().await;
        publisher.await.unwrap();

        let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
        assert_eq!(events[1].payload, "after");
    }

    #[tokio::test]
    async fn test_subscription_is_restartable() {
        let bus = EventBus::new();
        let id = Uuid::new_v4();
        bus.open(id);
        for _ in 0..3 {
            bus.publish(id, Stage::Validation, EventKind::Progress, "p", None);
        }
        bus.close(id);

        let first: Vec<AgentEvent> = bus.subscribe(id).unwrap().collect().await;
        let second: Vec<AgentEvent> = bus.subscribe(id).unwrap().collect().await;

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let bus = EventBus::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        bus.open(a);
        bus.open(b);

        bus.publish(a, Stage::Planning, EventKind::Thinking, "a1", None);
        bus.publish(b, Stage::Planning, EventKind::Thinking, "b1", None);
        bus.publish(a, Stage::Planning, EventKind::Thinking, "a2", None);

        assert_eq!(bus.last_sequence(a), 2);
        assert_eq!(bus.last_sequence(b), 1);
        assert!(bus.events(b).iter().all(|e| e.session_id == b));
    }
}
