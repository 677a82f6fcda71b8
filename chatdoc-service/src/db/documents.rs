//! Document CRUD operations.

use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::{Document, QuestionsStatus};
use crate::error::{DatabaseError, ServiceResult};

/// Column list matching `Document::from_row`.
const DOCUMENT_COLUMNS: &str = "id, owner_id, title, original_filename, storage_path, byte_size, \
     page_count, extracted_text, ocr_used, content_hash, status, remote_handle, \
     questions_status, registration_error, created_at, updated_at";

impl Database {
    /// Insert a new document
    pub fn insert_document(&self, doc: &Document) -> ServiceResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            INSERT INTO documents (id, owner_id, title, original_filename, storage_path, byte_size, page_count, extracted_text, ocr_used, content_hash, status, remote_handle, questions_status, registration_error, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                doc.id,
                doc.owner_id,
                doc.title,
                doc.original_filename,
                doc.storage_path,
                doc.byte_size as i64,
                doc.page_count,
                doc.extracted_text,
                doc.ocr_used,
                doc.content_hash,
                doc.status.as_str(),
                doc.remote_handle,
                doc.questions_status.as_str(),
                doc.registration_error,
                doc.created_at.to_rfc3339(),
                doc.updated_at.to_rfc3339(),
            ],
        )
        .map_err(DatabaseError::Query)?;

        Ok(())
    }

    /// Get a document by ID regardless of owner.
    /// Internal use only; caller-facing paths go through
    /// `get_document_for_owner`.
    pub fn get_document(&self, id: &str) -> ServiceResult<Option<Document>> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
            params![id],
            Document::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// Get a document by ID, scoped to its owner. Returns `None` both
    /// for missing documents and for documents owned by someone else.
    pub fn get_document_for_owner(
        &self,
        id: &str,
        owner_id: &str,
    ) -> ServiceResult<Option<Document>> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1 AND owner_id = ?2"),
            params![id, owner_id],
            Document::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// List documents for an owner, newest first
    pub fn list_documents(&self, owner_id: &str) -> ServiceResult<Vec<Document>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE owner_id = ?1 ORDER BY created_at DESC"
            ))
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params![owner_id], Document::from_row)
            .map_err(DatabaseError::Query)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    /// Find an owner's document with the same content hash (duplicate
    /// upload detection)
    pub fn get_document_by_hash(
        &self,
        owner_id: &str,
        content_hash: &str,
    ) -> ServiceResult<Option<Document>> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            &format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents \
                 WHERE owner_id = ?1 AND content_hash = ?2 ORDER BY created_at DESC LIMIT 1"
            ),
            params![owner_id, content_hash],
            Document::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// Record the result of text extraction and advance the lifecycle
    pub fn update_extraction(
        &self,
        document_id: &str,
        text: &str,
        page_count: i64,
        ocr_used: bool,
    ) -> ServiceResult<bool> {
        let conn = self.conn.lock().unwrap();

        let rows = conn
            .execute(
                "UPDATE documents SET extracted_text = ?1, page_count = ?2, ocr_used = ?3, \
                 status = 'text_extracted', updated_at = datetime('now') WHERE id = ?4",
                params![text, page_count, ocr_used, document_id],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Store the remote handle after successful registration. Advances
    /// the document to `registered` and question generation to
    /// `pending` in one statement.
    pub fn set_remote_handle(&self, document_id: &str, handle: &str) -> ServiceResult<bool> {
        let conn = self.conn.lock().unwrap();

        let rows = conn
            .execute(
                "UPDATE documents SET remote_handle = ?1, status = 'registered', \
                 questions_status = 'pending', registration_error = NULL, \
                 updated_at = datetime('now') WHERE id = ?2",
                params![handle, document_id],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Mark registration as failed (retryable). No handle is stored.
    pub fn set_registration_failed(&self, document_id: &str, error: &str) -> ServiceResult<bool> {
        let conn = self.conn.lock().unwrap();

        let rows = conn
            .execute(
                "UPDATE documents SET status = 'register_failed', registration_error = ?1, \
                 updated_at = datetime('now') WHERE id = ?2",
                params![error, document_id],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Update the question-generation status
    pub fn set_questions_status(
        &self,
        document_id: &str,
        status: QuestionsStatus,
    ) -> ServiceResult<bool> {
        let conn = self.conn.lock().unwrap();

        let rows = conn
            .execute(
                "UPDATE documents SET questions_status = ?1, updated_at = datetime('now') \
                 WHERE id = ?2",
                params![status.as_str(), document_id],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Documents with question generation still in flight, oldest first.
    /// Used by the background readiness worker.
    pub fn list_pending_question_documents(&self) -> ServiceResult<Vec<Document>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents \
                 WHERE questions_status = 'pending' ORDER BY created_at ASC"
            ))
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map([], Document::from_row)
            .map_err(DatabaseError::Query)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    /// Delete a document and all related data (cascades to questions,
    /// sessions are kept since they may span two documents)
    pub fn delete_document(&self, id: &str) -> ServiceResult<bool> {
        let conn = self.conn.lock().unwrap();

        let rows = conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id])
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }
}
