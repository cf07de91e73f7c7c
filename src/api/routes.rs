//! API route definitions.

use axum::http::Method;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use super::state::AppState;

/// Create the application router.
///
/// Both proxy endpoints accept POST and OPTIONS only; any other method is
/// answered with a structured 405. Cross-origin access is deliberately
/// permissive; the proxy holds no client-facing credentials.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/send-prompt",
            post(handlers::send_prompt)
                .options(handlers::preflight)
                .fallback(handlers::method_not_allowed),
        )
        .route(
            "/get-history",
            post(handlers::get_history)
                .options(handlers::preflight)
                .fallback(handlers::method_not_allowed),
        )
        .layer(cors)
        .layer(trace_layer)
        .with_state(state)
}
