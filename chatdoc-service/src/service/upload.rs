//! Upload pipeline: validate, store, extract, register.
//!
//! Only validation and storage are fatal to an upload. Extraction and
//! registration failures leave the document in a degraded but visible
//! state that later stages or a manual retry can recover from.

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::ChatDocService;
use crate::db::{Document, DocumentStatus, QuestionsStatus};
use crate::error::{ServiceError, ServiceResult};
use crate::extract;

/// Outcome of an upload request
#[derive(Debug)]
pub struct UploadOutcome {
    pub document: Document,
    /// True when the file matched an existing document by content hash
    /// and no new document was created.
    pub duplicate: bool,
}

impl ChatDocService {
    /// Run the full upload pipeline for a new file.
    ///
    /// Returns the stored document even when extraction or registration
    /// failed; the document's statuses tell the caller how far it got.
    pub async fn upload_document(
        &self,
        owner_id: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> ServiceResult<UploadOutcome> {
        validate_upload(filename, &bytes, self.config.limits.max_document_size_bytes)?;

        let content_hash = hash_bytes(&bytes);
        if let Some(existing) = self.db.get_document_by_hash(owner_id, &content_hash)? {
            info!(
                doc_id = %existing.id,
                "upload matched existing document by content hash"
            );
            return Ok(UploadOutcome {
                document: existing,
                duplicate: true,
            });
        }

        let id = Uuid::new_v4().to_string();
        let storage_path = self.store_file(&id, filename, &bytes).await?;

        let now = Utc::now();
        let document = Document {
            id: id.clone(),
            owner_id: owner_id.to_string(),
            title: title_from_filename(filename),
            original_filename: filename.to_string(),
            storage_path,
            byte_size: bytes.len() as u64,
            page_count: None,
            extracted_text: None,
            ocr_used: false,
            content_hash,
            status: DocumentStatus::Uploaded,
            remote_handle: None,
            questions_status: QuestionsStatus::NoHandle,
            registration_error: None,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_document(&document)?;

        self.run_extraction(&id, filename, &bytes).await;
        self.run_registration(&id, filename, bytes).await;

        // Re-read so the caller sees the statuses the pipeline reached
        let document = self
            .db
            .get_document(&id)?
            .ok_or_else(|| ServiceError::Internal {
                message: format!("Document {} vanished during upload", id),
            })?;

        Ok(UploadOutcome {
            document,
            duplicate: false,
        })
    }

    /// Retry registration for a document whose earlier attempt failed.
    /// A no-op if the document already has a handle.
    pub async fn retry_registration(&self, owner_id: &str, document_id: &str) -> ServiceResult<Document> {
        let document = self.owned_document(owner_id, document_id)?;

        if document.is_registered() {
            return Ok(document);
        }

        let bytes = tokio::fs::read(&document.storage_path)
            .await
            .map_err(|e| ServiceError::Internal {
                message: format!("Failed to read stored file: {}", e),
            })?;

        self.run_registration(&document.id, &document.original_filename, bytes)
            .await;

        self.owned_document(owner_id, document_id)
    }

    /// Regenerate quick questions by re-registering the document under
    /// a fresh handle. The old set is cleared once the new registration
    /// succeeds.
    pub async fn regenerate_questions(&self, owner_id: &str, document_id: &str) -> ServiceResult<Document> {
        let document = self.owned_document(owner_id, document_id)?;

        if !document.is_registered() {
            return Err(ServiceError::validation(
                "Document is not registered with the processing service yet",
            ));
        }

        let bytes = tokio::fs::read(&document.storage_path)
            .await
            .map_err(|e| ServiceError::Internal {
                message: format!("Failed to read stored file: {}", e),
            })?;

        // Hold the poll lock across the handle swap so an in-flight
        // poll of the old handle cannot settle the document with the
        // prior generation's questions.
        let lock = self.poll_lock(&document.id);
        let _guard = lock.lock().await;

        // A fresh registration restarts generation under a new handle.
        // The old questions are only dropped once the new registration
        // succeeded, so a failed regenerate leaves the document usable.
        let handle = self
            .remote
            .register(bytes, &document.original_filename)
            .await?;
        self.db.set_remote_handle(&document.id, &handle)?;
        self.db.replace_questions(&document.id, &[], "auto")?;
        info!(doc_id = %document.id, "question regeneration requested");

        self.owned_document(owner_id, document_id)
    }

    /// Delete a document, its stored file, and all dependent rows
    pub async fn delete_document(&self, owner_id: &str, document_id: &str) -> ServiceResult<()> {
        let document = self.owned_document(owner_id, document_id)?;

        if let Err(e) = tokio::fs::remove_file(&document.storage_path).await {
            warn!(doc_id = %document.id, error = %e, "failed to remove stored file");
        }

        self.db.delete_document(&document.id)?;
        self.poll_locks.remove(&document.id);
        info!(doc_id = %document.id, "document deleted");

        Ok(())
    }

    async fn store_file(&self, id: &str, filename: &str, bytes: &[u8]) -> ServiceResult<String> {
        let dir = self.config.storage.data_dir.join("documents");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ServiceError::Internal {
                message: format!("Failed to create document storage directory: {}", e),
            })?;

        let path = dir.join(format!("{}_{}", id, sanitize_filename(filename)));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ServiceError::Internal {
                message: format!("Failed to store uploaded file: {}", e),
            })?;

        Ok(path.to_string_lossy().into_owned())
    }

    /// Best-effort text extraction: local parse first, remote OCR when
    /// the file is locally unreadable or yields no usable text. Never
    /// fails the upload.
    async fn run_extraction(&self, document_id: &str, filename: &str, bytes: &[u8]) {
        let owned = bytes.to_vec();
        let local = tokio::task::spawn_blocking(move || extract::extract_pdf(&owned)).await;

        // Page count survives an empty parse; an unparseable file has
        // no reliable count at all.
        let page_count = match local {
            Ok(Ok(extraction)) => {
                if !extraction.is_effectively_empty() {
                    if let Err(e) = self.db.update_extraction(
                        document_id,
                        &extraction.text,
                        extraction.page_count,
                        false,
                    ) {
                        error!(doc_id = %document_id, error = %e, "failed to store extracted text");
                    }
                    return;
                }
                extraction.page_count
            }
            Ok(Err(e)) => {
                warn!(doc_id = %document_id, error = %e, "local text extraction failed");
                0
            }
            Err(e) => {
                error!(doc_id = %document_id, error = %e, "extraction task panicked");
                return;
            }
        };

        // Likely a scanned or damaged document; fall back to remote OCR
        info!(doc_id = %document_id, "no usable local text, trying remote OCR");
        match self.remote.extract_text(bytes.to_vec(), filename).await {
            Ok(text) if !text.trim().is_empty() => {
                if let Err(e) = self.db.update_extraction(document_id, &text, page_count, true) {
                    error!(doc_id = %document_id, error = %e, "failed to store OCR text");
                }
            }
            Ok(_) => {
                warn!(doc_id = %document_id, "remote OCR returned no text");
            }
            Err(e) => {
                warn!(doc_id = %document_id, error = %e, "remote OCR failed");
            }
        }
    }

    /// Best-effort registration with the remote service. A failure is
    /// recorded on the document and surfaced via the retry endpoint.
    async fn run_registration(&self, document_id: &str, filename: &str, bytes: Vec<u8>) {
        match self.remote.register(bytes, filename).await {
            Ok(handle) => {
                if let Err(e) = self.db.set_remote_handle(document_id, &handle) {
                    error!(doc_id = %document_id, error = %e, "failed to store remote handle");
                } else {
                    info!(doc_id = %document_id, "document registered, questions pending");
                }
            }
            Err(e) => {
                warn!(doc_id = %document_id, error = %e, "registration failed");
                if let Err(db_err) = self
                    .db
                    .set_registration_failed(document_id, &e.to_string())
                {
                    error!(doc_id = %document_id, error = %db_err, "failed to record registration failure");
                }
            }
        }
    }
}

fn validate_upload(filename: &str, bytes: &[u8], max_size: u64) -> ServiceResult<()> {
    if !filename.to_lowercase().ends_with(".pdf") {
        return Err(ServiceError::validation_field(
            "file",
            "Only PDF files are accepted",
        ));
    }

    if bytes.is_empty() {
        return Err(ServiceError::validation_field("file", "Uploaded file is empty"));
    }

    if bytes.len() as u64 > max_size {
        return Err(ServiceError::validation_field(
            "file",
            format!("File exceeds the maximum size of {} bytes", max_size),
        ));
    }

    if !extract::looks_like_pdf(bytes) {
        return Err(ServiceError::validation_field(
            "file",
            "File does not look like a PDF",
        ));
    }

    Ok(())
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn title_from_filename(filename: &str) -> String {
    filename
        .rsplit('/')
        .next()
        .unwrap_or(filename)
        .trim_end_matches(".pdf")
        .trim_end_matches(".PDF")
        .replace(['_', '-'], " ")
        .trim()
        .to_string()
}

fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}
