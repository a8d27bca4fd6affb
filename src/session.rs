//! Explicit session context.
//!
//! A session is created only by a successful login. It is removed by logout,
//! when the ERP API rejects its token, or after sitting idle too long. Every
//! ERP call takes the session it acts for; nothing reads the token from
//! ambient state.

use crate::schema::{now_iso8601, UserProfile};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    /// Upstream bearer token. Never sent back to the browser.
    pub token: String,
    pub user: UserProfile,
    pub started_at: String,
}

impl Session {
    pub fn new(token: String, user: UserProfile) -> Self {
        Self {
            id: format!("sess_{}", Uuid::new_v4().simple()),
            token,
            user,
            started_at: now_iso8601(),
        }
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

#[derive(Debug)]
struct Entry {
    session: Session,
    last_seen: Instant,
}

impl Entry {
    fn is_idle(&self, idle_timeout: Duration) -> bool {
        self.last_seen.elapsed() > idle_timeout
    }
}

/// Live sessions keyed by session id.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Entry>>>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout,
        }
    }

    /// Start a session for a freshly authenticated user.
    pub fn begin(&self, token: String, user: UserProfile) -> Session {
        let session = Session::new(token, user);
        let mut sessions = self.inner.write().unwrap();
        sessions.insert(
            session.id.clone(),
            Entry {
                session: session.clone(),
                last_seen: Instant::now(),
            },
        );
        info!("Session {} started for user {}", session.id, session.user.id);
        session
    }

    /// Look up a live session and mark it as used. Idle sessions are not
    /// returned; [`SessionStore::expire_idle`] removes them.
    pub fn get(&self, id: &str) -> Option<Session> {
        let mut sessions = self.inner.write().unwrap();
        let entry = sessions.get_mut(id)?;
        if entry.is_idle(self.idle_timeout) {
            return None;
        }
        entry.last_seen = Instant::now();
        Some(entry.session.clone())
    }

    /// Replace the cached user profile. Returns false if the session is gone.
    pub fn update_user(&self, id: &str, user: UserProfile) -> bool {
        let mut sessions = self.inner.write().unwrap();
        match sessions.get_mut(id) {
            Some(entry) => {
                entry.session.user = user;
                debug!("Session {}: profile refreshed", id);
                true
            }
            None => false,
        }
    }

    /// Tear down a session. Returns true if it existed.
    pub fn end(&self, id: &str) -> bool {
        let removed = self.inner.write().unwrap().remove(id).is_some();
        if removed {
            info!("Session {} ended", id);
        }
        removed
    }

    /// Remove every session idle for longer than the timeout and return
    /// their ids.
    pub fn expire_idle(&self) -> Vec<String> {
        let mut sessions = self.inner.write().unwrap();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| entry.is_idle(self.idle_timeout))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
            info!("Session {} expired after inactivity", id);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }
}
