use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::services::SessionManager;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    live_sessions: usize,
    capacity: usize,
}

/// Liveness plus session headroom; no API key required.
pub async fn health_check(
    State(sessions): State<Arc<SessionManager>>,
) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
            live_sessions: sessions.registry().len(),
            capacity: sessions.registry().capacity(),
        }),
    )
}
