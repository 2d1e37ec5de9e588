use axum::{
    middleware,
    routing::{delete, get, post},
    Extension, Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::handlers;
use crate::security::api_key_middleware;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    // Public routes (no API key)
    let public_routes = Router::new().route("/health", get(handlers::health::health_check));

    let protected_routes = Router::new()
        .route("/chat", get(handlers::session::create_session))
        .route("/post/{id}", post(handlers::chat::submit_turn))
        .route("/active-sessions", get(handlers::session::active_sessions))
        .route("/clear/{id}", delete(handlers::session::clear_session))
        .route("/events", get(handlers::events::session_events))
        .layer(middleware::from_fn(api_key_middleware))
        .layer(Extension(state.api_keys.clone()));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
