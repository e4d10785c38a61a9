//! In-memory session store.
//!
//! Process-wide mapping from session id to session state. Sessions are
//! created implicitly on first reference and live for the life of the
//! process; there is no eviction policy. Constructed at startup and passed
//! by `Arc` so tests can substitute a fresh instance.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use woz_core::ids::SessionId;
use woz_core::session::Session;

pub struct SessionStore {
    sessions: DashMap<SessionId, Arc<Mutex<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    fn entry(&self, id: &SessionId) -> Arc<Mutex<Session>> {
        if let Some(existing) = self.sessions.get(id) {
            return existing.clone();
        }
        self.sessions
            .entry(id.clone())
            .or_insert_with(|| {
                tracing::debug!(session_id = %id, "created session");
                Arc::new(Mutex::new(Session::new(id.clone())))
            })
            .clone()
    }

    /// Snapshot of the session, creating an empty one if absent.
    pub fn get_or_create(&self, id: &SessionId) -> Session {
        self.entry(id).lock().clone()
    }

    /// Run `f` on the session under its lock, creating it if absent.
    ///
    /// This is the single mutation entry point: holding the lock for the
    /// whole closure makes transcript-append + log-row-creation and the
    /// notes-mirroring write atomic with respect to every other caller.
    pub fn with_session<R>(&self, id: &SessionId, f: impl FnOnce(&mut Session) -> R) -> R {
        let entry = self.entry(id);
        let mut session = entry.lock();
        f(&mut session)
    }

    /// Replace the session's transcript and log with empty sequences,
    /// re-stamping `created_at`/`updated_at`. Keeps the same id.
    pub fn reset(&self, id: &SessionId) -> Session {
        self.with_session(id, |s| {
            s.reset();
            s.clone()
        })
    }

    /// Refresh `updated_at` without other side effects.
    pub fn touch(&self, id: &SessionId) {
        self.with_session(id, Session::touch);
    }

    /// Snapshots of all sessions currently held. Diagnostic use.
    pub fn list(&self) -> Vec<Session> {
        self.sessions.iter().map(|e| e.value().lock().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
