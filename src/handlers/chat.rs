use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::ConversationState;
use crate::services::session;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

// POST /api/chat/message
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let reply =
        session::process_message(&state, payload.session_id.trim(), payload.message.trim()).await;
    Json(ChatResponse { reply })
}

#[derive(Deserialize)]
pub struct ResetRequest {
    pub session_id: String,
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub reset: bool,
}

// POST /api/chat/reset
pub async fn reset(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResetRequest>,
) -> Json<ResetResponse> {
    let reset = session::reset_conversation(&state, payload.session_id.trim()).await;
    Json(ResetResponse { reset })
}

// GET /api/chat/state/:session_id
pub async fn get_state(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<ConversationState>, AppError> {
    session::get_state(&state, &session_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no conversation for session {session_id}")))
}
