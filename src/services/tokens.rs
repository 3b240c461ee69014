//! The refresh procedure: spends a session's refresh token for a new access token.
//!
//! Refreshes are serialized per session. A caller that queued behind an
//! in-flight refresh for the same session reuses its outcome instead of
//! spending the (possibly already rotated) refresh token a second time.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    repositories::session::SessionStore,
    services::oauth::OAuthClient,
};

/// Runs refreshes against the token endpoint and writes the results back to the store.
#[derive(Clone)]
pub struct TokenRefresher {
    sessions: Arc<dyn SessionStore>,
    oauth: OAuthClient,
    in_flight: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl TokenRefresher {
    /// Creates a new `TokenRefresher`.
    pub fn new(sessions: Arc<dyn SessionStore>, oauth: OAuthClient) -> Self {
        Self {
            sessions,
            oauth,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Refreshes the session's access token unconditionally.
    ///
    /// # Errors
    ///
    /// * `NotRefreshable` if the session is absent or holds no refresh token;
    ///   nothing is changed in that case.
    /// * `RefreshFailed` if the provider call failed; the session has been removed.
    pub async fn refresh(&self, id: &Uuid) -> Result<()> {
        let observed = self
            .sessions
            .get(id)
            .await
            .ok_or(AppError::NotRefreshable)?
            .access_token
            .clone();
        self.refresh_if_current(id, &observed).await
    }

    /// Refreshes the session unless its access token already differs from `observed`,
    /// which means another caller refreshed it while this one was waiting.
    pub async fn refresh_if_current(&self, id: &Uuid, observed: &str) -> Result<()> {
        let lock = self.lock_for(id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.refresh_locked(id, observed).await
        };
        self.release(id, lock).await;
        outcome
    }

    async fn refresh_locked(&self, id: &Uuid, observed: &str) -> Result<()> {
        let Some(mut session) = self.sessions.get(id).await else {
            return Err(AppError::NotRefreshable);
        };

        if session.access_token != observed {
            tracing::debug!("Session {} was refreshed by a concurrent request", id);
            return Ok(());
        }

        let Some(refresh_token) = session.refresh_token().map(str::to_owned) else {
            tracing::debug!("Session {} has no refresh token", id);
            return Err(AppError::NotRefreshable);
        };

        match self.oauth.refresh(&refresh_token).await {
            Ok(grant) => {
                let rotated = grant.refresh_token.is_some();
                session.apply_refresh(grant, Utc::now());
                let expires_at = session.expires_at;
                self.sessions.put(*id, session).await;
                tracing::info!(
                    "🔄 Refreshed session {} (expires at {}, refresh token rotated: {})",
                    id,
                    expires_at,
                    rotated
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!("Refresh failed for session {}: {}", id, e);
                self.sessions.remove(id).await;
                Err(AppError::RefreshFailed(e.to_string()))
            }
        }
    }

    async fn lock_for(&self, id: &Uuid) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        in_flight.entry(*id).or_default().clone()
    }

    async fn release(&self, id: &Uuid, lock: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().await;
        drop(lock);
        if in_flight
            .get(id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            in_flight.remove(id);
        }
    }

    #[cfg(test)]
    pub(crate) async fn pending_locks(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}
