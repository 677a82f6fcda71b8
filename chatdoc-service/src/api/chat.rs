//! Chat API endpoints.

use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::ChatMessage;
use crate::error::{ServiceError, ServiceResult};

use super::{AppState, owner_id};

/// Chat request: one document id for a regular chat, exactly two for a
/// comparison.
#[derive(Deserialize)]
pub struct ChatRequest {
    pub document_ids: Vec<String>,
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub session_id: String,
    pub message: ChatMessage,
}

/// History query parameters; document ids are comma-separated
#[derive(Deserialize)]
pub struct HistoryParams {
    pub document_ids: String,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub session_id: Option<String>,
    pub messages: Vec<ChatMessage>,
}

/// Run one chat turn
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> ServiceResult<Json<ChatResponse>> {
    let owner = owner_id(&headers)?;
    let outcome = state
        .service
        .chat(&owner, &request.document_ids, &request.message)
        .await?;

    Ok(Json(ChatResponse {
        success: true,
        session_id: outcome.session.id,
        message: outcome.assistant_message,
    }))
}

/// Fetch the conversation history for a document set
pub async fn chat_history_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HistoryParams>,
) -> ServiceResult<Json<HistoryResponse>> {
    let owner = owner_id(&headers)?;

    let document_ids: Vec<String> = params
        .document_ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if document_ids.is_empty() {
        return Err(ServiceError::validation_field(
            "document_ids",
            "At least one document id is required",
        ));
    }

    let messages = state.service.chat_history(&owner, &document_ids)?;
    let session_id = state
        .service
        .db
        .get_session(&owner, &crate::service::chat::session_key(&document_ids))?
        .map(|s| s.id);

    Ok(Json(HistoryResponse {
        success: true,
        session_id,
        messages,
    }))
}
