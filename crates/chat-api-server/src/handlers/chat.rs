use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::time::Instant;
use tracing::info;

use crate::models::chat::{TurnRequest, TurnResponse};
use crate::models::ConversationId;
use crate::services::session::SessionError;
use crate::state::AppState;
use crate::utils::error::ApiError;

/// `POST /post/{id}`: run one chat turn.
///
/// An id that is not live is admitted on the spot when
/// `session.implicit_admission` is on, and rejected with 404 otherwise.
pub async fn submit_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<TurnRequest>,
) -> Result<Response, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::BadRequest("Null conversation id".to_string()));
    }
    let payload = request
        .payload
        .clone()
        .ok_or_else(|| ApiError::BadRequest("No request sent".to_string()))?;
    let conversation_id = ConversationId::from(id);

    // Pinned until the end of the turn; releasing it refreshes activity
    // whatever the outcome.
    let _lease = state
        .sessions
        .begin_turn(&conversation_id, state.settings.session.implicit_admission)?;

    let start_time = Instant::now();
    let result = state
        .orchestrator
        .handle_turn(&conversation_id, &payload)
        .await;

    let request_json = serde_json::to_value(&request).unwrap_or_default();
    match result {
        Ok(reply) => {
            info!(
                conversation_id = %conversation_id,
                elapsed_ms = start_time.elapsed().as_millis() as u64,
                "Turn completed"
            );
            Ok(Json(TurnResponse {
                message: "Input received".to_string(),
                request: request_json,
                request_payload: payload,
                chat_api_response: reply,
                chat_request: "Success".to_string(),
            })
            .into_response())
        }
        Err(SessionError::ChainFailure(_)) => Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(TurnResponse {
                message: "Input received".to_string(),
                request: request_json,
                request_payload: payload,
                chat_api_response: String::new(),
                chat_request: "Chat Interface Failure".to_string(),
            }),
        )
            .into_response()),
        Err(e) => Err(e.into()),
    }
}
