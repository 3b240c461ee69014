use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Extension,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::session::{AuthenticatedSession, Session},
    state::AppState,
};

/// The query parameters the identity platform sends back to the callback.
#[derive(Deserialize, Debug, Default)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Starts a login by redirecting the browser to the identity platform.
#[axum::debug_handler]
pub async fn login(State(state): State<AppState>) -> Result<Response> {
    let login_state = state.login_states.issue().await;
    let url = state.oauth.authorize_url(&login_state.to_string());

    tracing::debug!("🔑 Redirecting to the authorize endpoint");

    Ok(Redirect::to(&url).into_response())
}

/// Completes a login: exchanges the code, creates a session and sends the
/// browser back to the frontend with the new session id.
#[axum::debug_handler]
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response> {
    if let Some(error) = query.error {
        tracing::error!(
            "❌ Authorization failed: {} ({})",
            error,
            query.error_description.as_deref().unwrap_or("no description")
        );
        return Err(AppError::OAuth(format!("Authentication error: {}", error)));
    }

    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::Validation("No auth code received".to_string()))?;

    let login_state = query.state.unwrap_or_default();
    if !state.login_states.consume(&login_state).await {
        tracing::warn!("❌ Callback with unknown or expired state");
        return Err(AppError::Validation("Invalid OAuth state".to_string()));
    }

    let grant = state.oauth.exchange_code(&code).await.map_err(|e| {
        tracing::error!("❌ Token exchange failed: {}", e);
        AppError::OAuth("Failed to exchange auth code for tokens".to_string())
    })?;

    let expires_in = grant.expires_in;
    let session_id = Uuid::new_v4();
    state
        .sessions
        .put(session_id, Session::from_grant(grant, Utc::now()))
        .await;

    tracing::info!(
        "✅ New session {} (token expires in {}s)",
        session_id,
        expires_in
    );

    let mut target = state.config.frontend_url.clone();
    target
        .query_pairs_mut()
        .append_pair("sessionId", &session_id.to_string());

    Ok(Redirect::to(target.as_str()).into_response())
}

/// Ends the session.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<AuthenticatedSession>,
) -> Result<Response> {
    state.sessions.remove(&session.id).await;

    tracing::info!("👋 Session {} logged out", session.id);

    Ok(StatusCode::NO_CONTENT.into_response())
}
