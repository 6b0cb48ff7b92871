use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

/// Header carrying the session id in both directions.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Most sessions held at once; opening one more evicts the least recently seen.
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

/// Sessions unseen for this long are dropped.
pub const DEFAULT_IDLE_MINUTES: i64 = 30;

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Logical client sessions, keyed by the id handed out on first contact.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    max_sessions: usize,
    idle: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_SESSIONS, Duration::minutes(DEFAULT_IDLE_MINUTES))
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding at most `max_sessions` (at least one), each dropped
    /// after `idle` without a request.
    pub fn with_limits(max_sessions: usize, idle: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            idle,
        }
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Match `requested` to a live session, or open a new one when it is
    /// absent or unknown. Returns the session id and whether it was created.
    pub fn resolve(&self, requested: Option<&str>) -> (String, bool) {
        let now = Utc::now();
        let mut sessions = self.table();

        let cutoff = now - self.idle;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_seen > cutoff);
        if sessions.len() < before {
            debug!(expired = before - sessions.len(), "Idle sessions dropped");
        }

        if let Some(id) = requested {
            if let Some(session) = sessions.get_mut(id) {
                session.last_seen = now;
                debug!(session = %id, "Session reused");
                return (id.to_string(), false);
            }
            debug!(session = %id, "Unknown session id, opening a new session");
        }

        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .values()
                .min_by_key(|s| s.last_seen)
                .map(|s| s.id.clone())
            else {
                break;
            };
            sessions.remove(&oldest);
            info!(session = %oldest, "Session evicted");
        }

        let id = uuid::Uuid::new_v4().to_string();
        sessions.insert(
            id.clone(),
            Session {
                id: id.clone(),
                created_at: now,
                last_seen: now,
            },
        );
        info!(session = %id, "Session opened");
        (id, true)
    }

    /// Discard a session. Returns `false` when the id was not known.
    pub fn close(&self, id: &str) -> bool {
        let removed = self.table().remove(id).is_some();
        if removed {
            info!(session = %id, "Session closed");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.table().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}
