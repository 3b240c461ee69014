use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::session::AuthenticatedSession,
    state::AppState,
};

/// Extracts the session id from an `Authorization: Bearer <id>` header.
///
/// # Arguments
///
/// * `headers` - The request headers.
///
/// # Returns
///
/// An `Option` containing the session ID if the header is present and well formed.
fn extract_session_id(headers: &HeaderMap) -> Option<Uuid> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Uuid::parse_str(token.trim()).ok()
}

/// A middleware that requires a known session id to be presented.
///
/// On success the request carries an [`AuthenticatedSession`] extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    let session_id = extract_session_id(request.headers()).ok_or_else(|| {
        tracing::debug!("❌ Missing or malformed bearer session id");
        AppError::Unauthenticated("Unauthorized".to_string())
    })?;

    if state.sessions.get(&session_id).await.is_none() {
        tracing::debug!("❌ Unknown session: {}", session_id);
        return Err(AppError::Unauthenticated(
            "Invalid or expired session".to_string(),
        ));
    }

    tracing::debug!("✅ Session authenticated: {}", session_id);

    request
        .extensions_mut()
        .insert(AuthenticatedSession { id: session_id });

    Ok(next.run(request).await)
}
