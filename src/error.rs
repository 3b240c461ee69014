use axum::{
    body::Bytes,
    extract::rejection::JsonRejection,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// No session, or the presented session id is unknown.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// The session has no refresh token to spend.
    #[error("Session cannot be refreshed")]
    NotRefreshable,

    /// The provider rejected a refresh; the session is gone.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The remote API rejected the call even after a refresh.
    #[error("Access token expired or invalid. Please log in again.")]
    ReauthRequired,

    /// A non-auth failure from the remote API, relayed as-is.
    #[error("Upstream request failed with status {status}")]
    Upstream { status: StatusCode, body: Bytes },

    /// The remote could not be reached or did not answer in time.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A conflict with an existing remote item.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A multipart error.
    #[error("Multipart error: {0}")]
    Multipart(String),

    /// The authorization code flow failed.
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::Transport("Request to provider timed out".to_string())
        } else {
            AppError::Transport(e.to_string())
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl AppError {
    /// Whether this is the remote API saying the bearer credential is no good.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, AppError::Upstream { status, .. } if *status == StatusCode::UNAUTHORIZED)
    }

    /// Replaces an empty upstream payload with a route-specific message.
    pub fn or_fallback(self, message: &str) -> Self {
        match self {
            AppError::Upstream { status, body } if body.is_empty() => AppError::Upstream {
                status,
                body: Bytes::from(error_body(message)),
            },
            other => other,
        }
    }
}

fn error_body(message: &str) -> String {
    sonic_rs::to_string(&sonic_rs::json!({ "error": message }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string())
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Unauthenticated(ref msg) => {
                tracing::warn!("Unauthenticated: {}", msg);
                (StatusCode::UNAUTHORIZED, msg.clone())
            }

            AppError::NotRefreshable => {
                tracing::warn!("Session has no refresh token");
                (StatusCode::UNAUTHORIZED, AppError::ReauthRequired.to_string())
            }

            AppError::RefreshFailed(ref msg) => {
                tracing::warn!("Token refresh failed: {}", msg);
                (StatusCode::UNAUTHORIZED, AppError::ReauthRequired.to_string())
            }

            AppError::ReauthRequired => {
                tracing::warn!("Re-authentication required");
                (StatusCode::UNAUTHORIZED, AppError::ReauthRequired.to_string())
            }

            AppError::Upstream { status, body } => {
                tracing::debug!("Relaying upstream failure: {}", status);
                let body = if body.is_empty() {
                    Bytes::from(error_body("Upstream request failed"))
                } else {
                    body
                };
                return (status, [(header::CONTENT_TYPE, "application/json")], body)
                    .into_response();
            }

            AppError::Transport(ref msg) => {
                tracing::error!("Transport error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Conflict(ref msg) => {
                tracing::debug!("Conflict: {}", msg);
                (StatusCode::CONFLICT, msg.clone())
            }

            AppError::Multipart(ref msg) => {
                tracing::error!("Multipart error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::OAuth(ref msg) => {
                tracing::error!("OAuth error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            error_body(&message),
        )
            .into_response()
    }
}
