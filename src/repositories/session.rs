use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::session::Session;

/// Storage for session records, keyed by session id.
///
/// Implementations must allow concurrent access to independent keys.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns a copy of the session, if present.
    async fn get(&self, id: &Uuid) -> Option<Session>;

    /// Inserts or replaces a session.
    async fn put(&self, id: Uuid, session: Session);

    /// Removes a session. Returns whether it existed.
    async fn remove(&self, id: &Uuid) -> bool;
}

/// A process-local session store. Sessions live until removed or until the process exits.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl InMemorySessionStore {
    /// Creates a new, empty `InMemorySessionStore`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &Uuid) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned()
    }

    async fn put(&self, id: Uuid, session: Session) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(id, session);
    }

    async fn remove(&self, id: &Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id).is_some()
    }
}
