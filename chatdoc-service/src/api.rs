//! HTTP API for the document chat service.
//!
//! Endpoints cover document upload and lifecycle, quick-question
//! retrieval, and chat over one or two documents. Every response is a
//! structured envelope: success payloads carry `success: true`, every
//! failure carries `success: false` with a stable error code.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::HeaderMap,
    routing::{delete, get, post},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{ServiceError, ServiceResult};
use crate::service::ChatDocService;

pub mod chat;
pub mod documents;
pub mod questions;

use chat::{chat_handler, chat_history_handler};
use documents::{
    delete_document_handler, get_document_handler, get_status_handler, list_documents_handler,
    retry_registration_handler, upload_document_handler,
};
use questions::{list_questions_handler, poll_questions_handler, regenerate_questions_handler};

/// Application state
pub struct AppState {
    pub service: Arc<ChatDocService>,
    pub start_time: Instant,
}

/// Resolve the calling user from the `X-User-Id` header.
///
/// Authentication proper is handled upstream; this service only needs
/// the identity for ownership scoping.
pub(crate) fn owner_id(headers: &HeaderMap) -> ServiceResult<String> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ServiceError::validation_field("x-user-id", "Missing X-User-Id header"))
}

/// Build the API router
pub fn router(service: Arc<ChatDocService>) -> Router {
    let max_body_size = service.config.limits.max_document_size_bytes as usize;

    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Document endpoints - larger body limit for uploads
        .route("/documents", get(list_documents_handler))
        .route(
            "/documents",
            post(upload_document_handler).layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route("/documents/{id}", get(get_document_handler))
        .route("/documents/{id}", delete(delete_document_handler))
        .route("/documents/{id}/status", get(get_status_handler))
        .route("/documents/{id}/retry", post(retry_registration_handler))
        // Quick questions
        .route("/documents/{id}/questions", get(list_questions_handler))
        .route("/documents/{id}/questions/poll", post(poll_questions_handler))
        .route(
            "/documents/{id}/questions/regenerate",
            post(regenerate_questions_handler),
        )
        // Chat
        .route("/chat", post(chat_handler))
        .route("/chat/history", get(chat_history_handler));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Health ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let remote_available = state.service.remote.health_check().await;

    Json(HealthResponse {
        status: if remote_available {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        remote_available,
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    remote_available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn owner_id_requires_header() {
        let mut headers = HeaderMap::new();
        assert!(owner_id(&headers).is_err());

        headers.insert("x-user-id", HeaderValue::from_static("  "));
        assert!(owner_id(&headers).is_err());

        headers.insert("x-user-id", HeaderValue::from_static(" alice "));
        assert_eq!(owner_id(&headers).unwrap(), "alice");
    }
}
