//! Concurrent session store
//!
//! Sessions live in a map keyed by id behind a `RwLock`; each session sits
//! behind its own `Mutex`. Frame processing only holds the map lock long
//! enough to clone the session handle, so work on different sessions never
//! blocks, while frames for the same session are serialized by its mutex.
//!
//! `remove` pops the entry under the write lock, so of several racing
//! removals exactly one receives the session. It then takes the state out of
//! the handle, leaving `None` behind for any frame that looked the session up
//! before it was removed.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::session::Session;

/// Shared handle to a session; empty once the session has ended
pub type SessionHandle = Arc<Mutex<Option<Session>>>;

/// Lock a session, recovering the state if a previous holder panicked.
pub fn lock_session(handle: &SessionHandle) -> MutexGuard<'_, Option<Session>> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of active sessions
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
    config: EngineConfig,
}

impl SessionStore {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Allocate a fresh session starting now
    pub fn create(&self, timer_minutes: u32) -> Uuid {
        self.create_at(timer_minutes, Utc::now())
    }

    /// Allocate a fresh session with an explicit start time
    pub fn create_at(&self, timer_minutes: u32, start_time: DateTime<Utc>) -> Uuid {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let mut id = Uuid::new_v4();
        while sessions.contains_key(&id) {
            id = Uuid::new_v4();
        }
        let session = Session::new(id, start_time, timer_minutes, &self.config);
        sessions.insert(id, Arc::new(Mutex::new(Some(session))));
        id
    }

    /// Look up a live session
    pub fn get(&self, id: &Uuid) -> Result<SessionHandle, EngineError> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))
    }

    /// Atomically remove a session and return its final state.
    ///
    /// Waits for any frame currently being applied to that session. Frames
    /// that arrive afterwards through an old handle find it empty.
    pub fn remove(&self, id: &Uuid) -> Result<Session, EngineError> {
        let handle = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))?;

        let session = lock_session(&handle).take();
        session.ok_or_else(|| EngineError::SessionNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Ids of all live sessions
    pub fn ids(&self) -> Vec<Uuid> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
