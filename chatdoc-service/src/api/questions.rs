//! Quick-question API endpoints.
//!
//! The poll endpoint is the interactive path: it waits a bounded number
//! of attempts for questions to settle and tells the client whether to
//! stop or come back. The background worker keeps polling documents the
//! interactive budget gave up on.

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use serde::Serialize;
use std::sync::Arc;

use crate::db::{Document, QuickQuestion};
use crate::error::ServiceResult;
use crate::service::readiness::WaitOutcome;

use super::{AppState, owner_id};

/// Client-facing poll state. `pending` means "come back later";
/// `ready` and `failed` are final until a regenerate.
#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollState {
    Ready,
    Failed,
    Pending,
    Unregistered,
}

/// Response for a bounded question poll
#[derive(Serialize)]
pub struct PollResponse {
    pub success: bool,
    pub state: PollState,
    pub message: String,
    pub questions: Vec<QuickQuestion>,
}

#[derive(Serialize)]
pub struct QuestionsResponse {
    pub success: bool,
    pub questions: Vec<QuickQuestion>,
}

#[derive(Serialize)]
pub struct RegenerateResponse {
    pub success: bool,
    pub message: String,
    pub document: Document,
}

/// Wait (bounded) for a document's questions to settle
pub async fn poll_questions_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ServiceResult<Json<PollResponse>> {
    let owner = owner_id(&headers)?;
    let outcome = state.service.wait_for_questions(&owner, &id).await?;

    let response = match outcome {
        WaitOutcome::Ready { questions } => PollResponse {
            success: true,
            state: PollState::Ready,
            message: "Questions are ready".to_string(),
            questions,
        },
        WaitOutcome::Failed { message } => PollResponse {
            success: true,
            state: PollState::Failed,
            message,
            questions: Vec::new(),
        },
        WaitOutcome::StillPending { attempts, elapsed_secs } => PollResponse {
            success: true,
            state: PollState::Pending,
            message: format!(
                "Still generating after {} attempts over {}s; check back later",
                attempts, elapsed_secs
            ),
            questions: Vec::new(),
        },
        WaitOutcome::NotRegistered => PollResponse {
            success: true,
            state: PollState::Unregistered,
            message: "Document is not registered with the processing service".to_string(),
            questions: Vec::new(),
        },
    };

    Ok(Json(response))
}

/// List the currently stored questions without waiting
pub async fn list_questions_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ServiceResult<Json<QuestionsResponse>> {
    let owner = owner_id(&headers)?;
    let questions = state.service.list_questions(&owner, &id)?;

    Ok(Json(QuestionsResponse {
        success: true,
        questions,
    }))
}

/// Request a fresh question set for a registered document
pub async fn regenerate_questions_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ServiceResult<Json<RegenerateResponse>> {
    let owner = owner_id(&headers)?;
    let document = state.service.regenerate_questions(&owner, &id).await?;

    Ok(Json(RegenerateResponse {
        success: true,
        message: "Question regeneration started".to_string(),
        document,
    }))
}
