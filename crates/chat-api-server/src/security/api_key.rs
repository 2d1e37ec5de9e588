use axum::http::HeaderMap;
use tracing::warn;

use crate::utils::error::ApiError;

pub const API_KEY_HEADER: &str = "API-KEY";

/// Checks the shared API key header. With no key configured every request passes.
#[derive(Debug, Clone)]
pub struct ApiKeyValidator {
    expected: Option<String>,
}

impl ApiKeyValidator {
    pub fn new(expected: Option<String>) -> Self {
        if expected.is_none() {
            warn!("No API key configured, protected routes are open");
        }
        Self { expected }
    }

    pub fn is_enabled(&self) -> bool {
        self.expected.is_some()
    }

    pub fn validate(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let Some(expected) = &self.expected else {
            return Ok(());
        };

        let provided = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing API-KEY header".to_string()))?;

        if provided != expected {
            return Err(ApiError::Unauthorized("Invalid API key".to_string()));
        }
        Ok(())
    }
}
