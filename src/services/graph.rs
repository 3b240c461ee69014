//! The authenticated request forwarder.
//!
//! Every call to the Graph API goes through [`GraphClient::send`], which
//! refreshes an expired access token before the call, and on a 401 refreshes
//! once more and retries exactly once.

use std::sync::Arc;

use axum::body::Bytes;
use chrono::Utc;
use http::{header, Method, StatusCode};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    repositories::session::SessionStore,
    services::tokens::TokenRefresher,
};

/// The body of a forwarded call.
#[derive(Debug, Clone)]
pub enum Payload {
    Empty,
    Json(Bytes),
    Binary { content: Bytes, content_type: String },
}

/// A call to forward: method, absolute URL and optional body.
#[derive(Debug, Clone)]
pub struct GraphRequest {
    pub method: Method,
    pub url: String,
    pub payload: Payload,
}

impl GraphRequest {
    pub fn get(url: String) -> Self {
        Self {
            method: Method::GET,
            url,
            payload: Payload::Empty,
        }
    }

    pub fn delete(url: String) -> Self {
        Self {
            method: Method::DELETE,
            url,
            payload: Payload::Empty,
        }
    }

    /// A request with a JSON body.
    pub fn json<T: Serialize>(method: Method, url: String, body: &T) -> Result<Self> {
        let encoded = sonic_rs::to_vec(body)
            .map_err(|e| AppError::Internal(format!("Request serialization failed: {}", e)))?;
        Ok(Self {
            method,
            url,
            payload: Payload::Json(Bytes::from(encoded)),
        })
    }

    /// A `PUT` carrying raw file content.
    pub fn put_content(url: String, content: Bytes, content_type: String) -> Self {
        Self {
            method: Method::PUT,
            url,
            payload: Payload::Binary {
                content,
                content_type,
            },
        }
    }
}

/// A successful reply from the Graph API.
#[derive(Debug, Clone)]
pub struct GraphResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Forwards calls to the Graph API on behalf of a session.
#[derive(Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    sessions: Arc<dyn SessionStore>,
    refresher: TokenRefresher,
}

impl GraphClient {
    /// Creates a new `GraphClient`.
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        sessions: Arc<dyn SessionStore>,
        refresher: TokenRefresher,
    ) -> Self {
        Self {
            http,
            base_url,
            sessions,
            refresher,
        }
    }

    /// Joins a Graph path (starting with `/`) onto the configured base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Forwards `request` with the session's access token.
    ///
    /// # Errors
    ///
    /// * `Unauthenticated` if the session does not exist.
    /// * `ReauthRequired` if the call is rejected with 401 and a refresh does not fix it.
    /// * `Upstream` for any other non-success status, with the remote payload.
    /// * `Transport` if the remote could not be reached in time.
    pub async fn send(&self, id: &Uuid, request: &GraphRequest) -> Result<GraphResponse> {
        let session = self
            .sessions
            .get(id)
            .await
            .ok_or_else(|| AppError::Unauthenticated("Session not found".to_string()))?;

        // Proceed with whatever token we end up holding: a failed refresh here
        // surfaces through the 401 path below.
        if session.is_expired_at(Utc::now()) {
            tracing::debug!("Access token for session {} expired, refreshing", id);
            if let Err(e) = self
                .refresher
                .refresh_if_current(id, &session.access_token)
                .await
            {
                tracing::warn!("Proactive refresh for session {} failed: {}", id, e);
            }
        }

        let token = match self.sessions.get(id).await {
            Some(current) => current.access_token.clone(),
            None => session.access_token.clone(),
        };

        match self.dispatch(request, &token).await {
            Err(e) if e.is_auth_rejection() => {
                tracing::info!("Graph rejected the token of session {}, refreshing once", id);
                self.retry_after_refresh(id, request, &token).await
            }
            other => other,
        }
    }

    async fn retry_after_refresh(
        &self,
        id: &Uuid,
        request: &GraphRequest,
        rejected_token: &str,
    ) -> Result<GraphResponse> {
        match self.refresher.refresh_if_current(id, rejected_token).await {
            Ok(()) => {}
            Err(AppError::NotRefreshable) => {
                self.sessions.remove(id).await;
                return Err(AppError::ReauthRequired);
            }
            Err(e) => {
                tracing::warn!("Reactive refresh for session {} failed: {}", id, e);
                return Err(AppError::ReauthRequired);
            }
        }

        let token = self
            .sessions
            .get(id)
            .await
            .map(|s| s.access_token.clone())
            .ok_or(AppError::ReauthRequired)?;

        match self.dispatch(request, &token).await {
            Err(e) if e.is_auth_rejection() => {
                tracing::warn!("Graph rejected session {} again after refresh", id);
                Err(AppError::ReauthRequired)
            }
            other => other,
        }
    }

    async fn dispatch(&self, request: &GraphRequest, token: &str) -> Result<GraphResponse> {
        let mut builder = self
            .http
            .request(request.method.clone(), &request.url)
            .bearer_auth(token);

        builder = match &request.payload {
            Payload::Empty => builder,
            Payload::Json(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.clone()),
            Payload::Binary {
                content,
                content_type,
            } => builder
                .header(header::CONTENT_TYPE, content_type.as_str())
                .body(content.clone()),
        };

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        tracing::debug!("{} {} -> {}", request.method, request.url, status);

        if status.is_success() {
            Ok(GraphResponse { status, body })
        } else {
            Err(AppError::Upstream { status, body })
        }
    }
}
