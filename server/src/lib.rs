pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Room for multipart framing on top of the file size limit.
const MULTIPART_SLACK_BYTES: usize = 64 * 1024;

/// Builds the HTTP router over shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_upload_bytes().saturating_add(MULTIPART_SLACK_BYTES);

    let authenticated = Router::new()
        .route("/", get(routes::list))
        .route("/upload", post(routes::upload))
        .route("/{id}", get(routes::get_status))
        .route("/{id}/result", get(routes::get_result))
        .route("/{id}/requeue", post(routes::requeue))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let slips = Router::new()
        .route("/callback", post(routes::ocr_callback))
        .merge(authenticated);

    Router::new()
        .route("/health", get(routes::health))
        .nest("/api/slips", slips)
        .fallback(routes::not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        // method + path + status + latency; no query strings or headers
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
}
