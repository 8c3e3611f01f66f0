//! Durable state shared by the poller and the query service.
//!
//! Polled state is published as a whole `Arc` so readers see either the state
//! before a tick or the state after it, never a half-merged one. Sessions are
//! kept apart because they change through begin/end calls, not through ticks.

use std::sync::{Arc, RwLock};

use profiler_datastore_protocol::Session;

use crate::reconciler::PolledState;

#[derive(Debug, Default)]
pub struct SharedState {
    polled: RwLock<Arc<PolledState>>,
    sessions: RwLock<Vec<Session>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn polled_snapshot(&self) -> Arc<PolledState> {
        self.polled
            .read()
            .map(|state| Arc::clone(&*state))
            .unwrap_or_else(|poisoned| Arc::clone(&*poisoned.into_inner()))
    }

    /// Publishes `next` in a single replace.
    pub fn commit_polled(&self, next: PolledState) {
        let mut polled = self
            .polled
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *polled = Arc::new(next);
    }

    pub fn sessions_snapshot(&self) -> Vec<Session> {
        self.sessions
            .read()
            .map(|sessions| sessions.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn find_session(&self, session_id: i64) -> Option<Session> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .find(|session| session.session_id == session_id)
            .cloned()
    }

    /// Appends a new session. Returns `false` if the id is already taken.
    pub fn append_session(&self, session: Session) -> bool {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if sessions
            .iter()
            .any(|existing| existing.session_id == session.session_id)
        {
            return false;
        }
        sessions.push(session);
        true
    }

    /// Applies `update` to the session with `session_id` in place.
    pub fn update_session<T>(
        &self,
        session_id: i64,
        update: impl FnOnce(&mut Session) -> T,
    ) -> Option<T> {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions
            .iter_mut()
            .find(|session| session.session_id == session_id)
            .map(update)
    }
}
