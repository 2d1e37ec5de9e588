use axum::{extract::Request, middleware::Next, response::Response};
use std::sync::Arc;
use tracing::debug;

use crate::security::ApiKeyValidator;
use crate::utils::error::ApiError;

/// Rejects requests without a valid `API-KEY` header.
/// Expects an `Arc<ApiKeyValidator>` request extension.
pub async fn api_key_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    let validator = request
        .extensions()
        .get::<Arc<ApiKeyValidator>>()
        .ok_or_else(|| ApiError::InternalError("API key validator not configured".to_string()))?
        .clone();

    validator.validate(request.headers())?;
    debug!(path = %request.uri().path(), "API key accepted");

    Ok(next.run(request).await)
}
