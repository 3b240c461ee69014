use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

/// How long a login attempt may take between redirect and callback.
pub const LOGIN_STATE_TTL_SECS: i64 = 10 * 60;

/// Outstanding OAuth `state` values, each usable for exactly one callback.
#[derive(Clone)]
pub struct LoginStateStore {
    issued: Arc<Mutex<HashMap<Uuid, DateTime<Utc>>>>,
    ttl: Duration,
}

impl Default for LoginStateStore {
    fn default() -> Self {
        Self::new(Duration::seconds(LOGIN_STATE_TTL_SECS))
    }
}

impl LoginStateStore {
    /// Creates a new `LoginStateStore` whose entries expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            issued: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Issues a fresh state value.
    pub async fn issue(&self) -> Uuid {
        let state = Uuid::new_v4();
        self.issued.lock().await.insert(state, Utc::now());
        state
    }

    /// Consumes a state value. Returns `false` if it was unknown or stale.
    pub async fn consume(&self, state: &str) -> bool {
        let Ok(state) = Uuid::parse_str(state) else {
            return false;
        };
        match self.issued.lock().await.remove(&state) {
            Some(issued_at) => Utc::now() - issued_at <= self.ttl,
            None => false,
        }
    }

    /// Drops every entry older than the TTL. Returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut issued = self.issued.lock().await;
        let before = issued.len();
        issued.retain(|_, issued_at| now - *issued_at <= self.ttl);
        before - issued.len()
    }
}
