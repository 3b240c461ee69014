use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Router,
};
use http::{header, Method};
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::{
    cors::CorsLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    error::{AppError, Result},
    handlers, middleware_layer,
    state::AppState,
};

/// Headroom on top of the file size for multipart framing and the other fields.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Builds the application router: login flow, authenticated drive API and the bundled UI.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(state.config.frontend_origin.clone())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400));

    let auth_routes = Router::new()
        .route("/auth/login", get(handlers::auth::login))
        .route("/auth/callback", get(handlers::auth::callback))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/api/files", get(handlers::drive::list_files))
        .route("/api/shared", get(handlers::drive::list_shared))
        .route("/api/create-folder", post(handlers::drive::create_folder))
        .route("/api/upload", post(handlers::drive::upload_file))
        .route(
            "/api/items/{item_id}",
            patch(handlers::drive::rename_item).delete(handlers::drive::delete_item),
        )
        .route("/api/share", post(handlers::drive::share_item))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state.clone());

    Router::new()
        .merge(auth_routes)
        .merge(protected_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(DefaultBodyLimit::max(
            state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES,
        ))
        .layer(cors)
        .fallback_service(ServeDir::new(&state.config.static_dir))
}

/// Wraps the router in a per-IP rate limit.
///
/// The limiter keys on the peer address, so the app must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn rate_limited(router: Router, state: &AppState) -> Result<Router> {
    // The builder takes the interval between replenished permits, not a rate.
    let interval_ns = 1_000_000_000 / state.config.rate_limit_per_second.max(1);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_nanosecond(interval_ns)
            .burst_size(state.config.rate_limit_burst)
            .use_headers()
            .finish()
            .ok_or_else(|| AppError::Internal("Invalid rate limit configuration".to_string()))?,
    );

    tracing::info!(
        "✅ Rate limit: {} req/s per IP, burst {}",
        state.config.rate_limit_per_second,
        state.config.rate_limit_burst
    );

    Ok(router.layer(tower_governor::GovernorLayer::new(governor_conf)))
}
