//! Document API endpoints: upload, listing, status, retry, delete.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::HeaderMap,
};
use serde::Serialize;
use std::sync::Arc;

use crate::db::{Document, DocumentStatus, QuestionsStatus};
use crate::error::{ServiceError, ServiceResult};

use super::{AppState, owner_id};

/// Response for a successful upload
#[derive(Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    /// True when the file matched an existing document and no new one
    /// was created
    pub duplicate: bool,
    /// Where the uploaded document can be fetched
    pub location: String,
    pub document: Document,
}

fn document_location(id: &str) -> String {
    format!("/api/documents/{}", id)
}

/// Response for document listings
#[derive(Serialize)]
pub struct ListDocumentsResponse {
    pub success: bool,
    pub documents: Vec<Document>,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub success: bool,
    pub document: Document,
}

/// Lightweight status payload for polling clients
#[derive(Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub status: DocumentStatus,
    pub questions_status: QuestionsStatus,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// Upload a new document
pub async fn upload_document_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ServiceResult<Json<UploadResponse>> {
    let owner = owner_id(&headers)?;

    let mut file_data: Option<(Vec<u8>, String)> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or("").to_string();

        if name == "file" {
            let filename = field.file_name().unwrap_or("document.pdf").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ServiceError::validation_field("file", e.to_string()))?;
            file_data = Some((data.to_vec(), filename));
        }
    }

    let (data, filename) =
        file_data.ok_or_else(|| ServiceError::validation_field("file", "No file provided"))?;

    let outcome = state.service.upload_document(&owner, &filename, data).await?;

    let message = if outcome.duplicate {
        "Document already uploaded".to_string()
    } else {
        "Document uploaded".to_string()
    };

    Ok(Json(UploadResponse {
        success: true,
        message,
        duplicate: outcome.duplicate,
        location: document_location(&outcome.document.id),
        document: outcome.document,
    }))
}

/// List the caller's documents
pub async fn list_documents_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ServiceResult<Json<ListDocumentsResponse>> {
    let owner = owner_id(&headers)?;
    let documents = state.service.db.list_documents(&owner)?;

    Ok(Json(ListDocumentsResponse {
        success: true,
        documents,
    }))
}

/// Get a single document
pub async fn get_document_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ServiceResult<Json<DocumentResponse>> {
    let owner = owner_id(&headers)?;
    let document = state.service.owned_document(&owner, &id)?;

    Ok(Json(DocumentResponse {
        success: true,
        document,
    }))
}

/// Get just the lifecycle statuses, cheap enough to poll
pub async fn get_status_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ServiceResult<Json<StatusResponse>> {
    let owner = owner_id(&headers)?;
    let document = state.service.owned_document(&owner, &id)?;

    Ok(Json(StatusResponse {
        success: true,
        status: document.status,
        questions_status: document.questions_status,
    }))
}

/// Retry a failed registration
pub async fn retry_registration_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ServiceResult<Json<DocumentResponse>> {
    let owner = owner_id(&headers)?;
    let document = state.service.retry_registration(&owner, &id).await?;

    Ok(Json(DocumentResponse {
        success: true,
        document,
    }))
}

/// Delete a document and everything derived from it
pub async fn delete_document_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ServiceResult<Json<DeleteResponse>> {
    let owner = owner_id(&headers)?;
    state.service.delete_document(&owner, &id).await?;

    Ok(Json(DeleteResponse {
        success: true,
        message: "Document deleted".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_location_points_at_the_document() {
        assert_eq!(document_location("doc-1"), "/api/documents/doc-1");
    }
}
