//! Sessions and the registry that owns them.
//!
//! A [`Session`] binds one document's [`VectorIndex`] and working directory
//! under an opaque id. Its phase moves
//! `Created → Indexed → Ready → (Querying ⇄ Ready) → Closed`; only `Ready`
//! sessions are placed in the [`SessionRegistry`].
//!
//! Work on one session is serialized by an async lock around its index; a
//! query holds it from reformulation until the turns are appended. Different
//! sessions share nothing but the registry map, which is only locked for
//! lookups and inserts.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use docqa_core::index::VectorIndex;

use crate::index_store::IndexStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Created,
    Indexed,
    Ready,
    Querying,
    Closed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionPhase::Created => "created",
            SessionPhase::Indexed => "indexed",
            SessionPhase::Ready => "ready",
            SessionPhase::Querying => "querying",
            SessionPhase::Closed => "closed",
        })
    }
}

pub struct Session {
    id: String,
    filename: String,
    store: IndexStore,
    phase: Mutex<SessionPhase>,
    last_used: Mutex<Instant>,
    index: tokio::sync::Mutex<Option<VectorIndex>>,
}

impl Session {
    pub fn new(id: String, filename: String, store: IndexStore) -> Self {
        Self {
            id,
            filename,
            store,
            phase: Mutex::new(SessionPhase::Created),
            last_used: Mutex::new(Instant::now()),
            index: tokio::sync::Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_phase(&self, phase: SessionPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    /// Exclusive access to the session's index for one operation.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, Option<VectorIndex>> {
        self.index.lock().await
    }

    pub fn touch(&self) {
        *self.last_used.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

/// Live sessions keyed by id, with an optional idle TTL.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    ttl: Option<Duration>,
}

impl SessionRegistry {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn insert(&self, session: Arc<Session>) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(session.id().to_string(), session);
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(id)
    }

    /// Ids of sessions idle for longer than the TTL. Empty without a TTL.
    pub fn expired(&self) -> Vec<String> {
        let Some(ttl) = self.ttl else {
            return Vec::new();
        };
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .values()
            .filter(|s| s.idle_for() > ttl)
            .map(|s| s.id().to_string())
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn session(id: &str) -> Arc<Session> {
        Arc::new(Session::new(
            id.to_string(),
            "doc.txt".to_string(),
            IndexStore::for_session(Path::new("/tmp/docqa-test"), id),
        ))
    }

    #[test]
    fn test_new_session_starts_created() {
        let s = session("a");
        assert_eq!(s.phase(), SessionPhase::Created);
        s.set_phase(SessionPhase::Ready);
        assert_eq!(s.phase(), SessionPhase::Ready);
        assert_eq!(s.phase().to_string(), "ready");
    }

    #[test]
    fn test_registry_insert_get_remove() {
        let registry = SessionRegistry::new(None);
        registry.insert(session("a"));
        assert!(registry.get("a").is_some());
        assert!(registry.get("b").is_none());
        assert!(registry.remove("a").is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let registry = SessionRegistry::new(None);
        registry.insert(session("a"));
        assert!(registry.expired().is_empty());
    }

    #[test]
    fn test_idle_sessions_expire() {
        let registry = SessionRegistry::new(Some(Duration::from_millis(20)));
        registry.insert(session("old"));
        std::thread::sleep(Duration::from_millis(40));
        registry.insert(session("fresh"));
        assert_eq!(registry.expired(), vec!["old".to_string()]);

        registry.get("old").unwrap().touch();
        assert!(registry.expired().is_empty());
    }
}
