use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::session::{SessionEvent, SessionObserver, SessionOrchestrator};

/// Most recent observer events kept for `/events`
const EVENT_LOG_CAPACITY: usize = 256;

/// Observer that keeps the latest events for polling clients
#[derive(Default)]
pub struct EventLog {
    events: Mutex<VecDeque<SessionEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recent(&self) -> Vec<SessionEvent> {
        self.events.lock().iter().cloned().collect()
    }
}

impl SessionObserver for EventLog {
    fn notify(&self, event: SessionEvent) {
        let mut events = self.events.lock();
        if events.len() == EVENT_LOG_CAPACITY {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub session: SessionOrchestrator,
    pub events: Arc<EventLog>,
}

impl AppState {
    /// Attach a fresh event log to `session`
    pub fn new(session: SessionOrchestrator) -> Self {
        let events = Arc::new(EventLog::new());
        session.attach(events.clone());
        Self { session, events }
    }
}
