use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::models::chat::{ClearResponse, CreateSessionQuery, MessageResponse, SessionCreated};
use crate::models::ConversationId;
use crate::services::session::{SessionError, SessionManager, SessionsSnapshot};
use crate::utils::error::ApiError;

/// `GET /chat`: admit a conversation, generating an id if none was supplied.
pub async fn create_session(
    State(sessions): State<Arc<SessionManager>>,
    Query(query): Query<CreateSessionQuery>,
) -> Result<Json<SessionCreated>, ApiError> {
    let conversation_id = query
        .conversation_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .map(ConversationId::from)
        .unwrap_or_else(ConversationId::generate);

    let admission = sessions.try_admit(&conversation_id)?;

    Ok(Json(SessionCreated {
        message: "API session created".to_string(),
        conversation_id,
        status: admission.as_str(),
    }))
}

/// `DELETE /clear/{id}`
pub async fn clear_session(
    State(sessions): State<Arc<SessionManager>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::BadRequest("Null conversation id".to_string()));
    }
    let conversation_id = ConversationId::from(id);

    match sessions.clear(&conversation_id) {
        Ok(outcome) => Ok(Json(ClearResponse {
            message: format!("Session history cleared code: {}", outcome.code()),
            outcome: outcome.as_str(),
        })
        .into_response()),
        Err(SessionError::ConsistencyViolation(violation)) => {
            error!(conversation_id = %conversation_id, "Clear failed: {}", violation);
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(MessageResponse::new("Unable to delete from chat interface")),
            )
                .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// `GET /active-sessions`: registry entries and store keys, also logged.
pub async fn active_sessions(State(sessions): State<Arc<SessionManager>>) -> Json<SessionsSnapshot> {
    let snapshot = sessions.snapshot();

    let live: Vec<&str> = snapshot
        .sessions
        .iter()
        .map(|s| s.conversation_id.as_str())
        .collect();
    let stored: Vec<&str> = snapshot
        .conversations
        .iter()
        .map(|c| c.conversation_id.as_str())
        .collect();
    info!(
        capacity = snapshot.capacity,
        live = ?live,
        conversations = ?stored,
        "Active sessions"
    );

    Json(snapshot)
}
