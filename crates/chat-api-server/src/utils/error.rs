use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::services::session::SessionError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("LLM error: {0}")]
    LlmError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized: {}", msg);
                (StatusCode::UNAUTHORIZED, "Unauthorized", msg)
            }
            ApiError::NotFound(msg) => {
                tracing::warn!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, "NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, "BadRequest", msg)
            }
            ApiError::ServiceUnavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "ServiceUnavailable", msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
            }
            ApiError::LlmError(msg) => {
                tracing::error!("LLM error: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "LlmError", msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::CapacityExceeded { .. } => {
                ApiError::ServiceUnavailable("Server at capacity, please try again later".to_string())
            }
            SessionError::ChainFailure(msg) => ApiError::LlmError(msg),
            SessionError::ConsistencyViolation(v) => ApiError::InternalError(v.to_string()),
            SessionError::UnknownConversation(id) => {
                ApiError::NotFound(format!("Unknown conversation: {}", id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConversationId;
    use crate::services::session::ConsistencyViolation;

    fn status_of(err: SessionError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_session_error_status_mapping() {
        assert_eq!(
            status_of(SessionError::CapacityExceeded { capacity: 3 }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(SessionError::ChainFailure("boom".to_string())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(SessionError::ConsistencyViolation(
                ConsistencyViolation::memory_not_released(&ConversationId::from("x"))
            )),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(SessionError::UnknownConversation(ConversationId::from("x"))),
            StatusCode::NOT_FOUND
        );
    }
}
