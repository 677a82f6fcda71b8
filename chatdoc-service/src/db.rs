//! Database module for SQLite operations.
//!
//! Provides the `Database` struct and all database operations organized
//! into submodules by domain.

mod documents;
mod migrations;
pub mod models;
mod questions;
mod sessions;

pub use models::{
    ChatMessage, ChatSession, Document, DocumentStatus, MessageRole, QuestionsStatus,
    QuickQuestion,
};

use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{DatabaseError, ServiceResult};

/// Database manager for SQLite operations
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database at the given path
    pub fn open(path: &Path) -> ServiceResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Migration {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let conn = Connection::open(path).map_err(DatabaseError::Connection)?;

        // WAL mode for better concurrency between request handlers and
        // the background poll worker
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(DatabaseError::Query)?;

        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database for tests
    #[cfg(test)]
    pub fn open_in_memory() -> ServiceResult<Self> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::Connection)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(DatabaseError::Query)?;
        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;

    use super::models::{Document, DocumentStatus, QuestionsStatus};

    /// Freshly-uploaded document fixture, nothing extracted or
    /// registered yet.
    pub fn make_document(id: &str, owner_id: &str) -> Document {
        let now = Utc::now();
        Document {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            title: format!("{id} title"),
            original_filename: format!("{id}.pdf"),
            storage_path: format!("/tmp/{id}.pdf"),
            byte_size: 1024,
            page_count: None,
            extracted_text: None,
            ocr_used: false,
            content_hash: format!("hash-{id}"),
            status: DocumentStatus::Uploaded,
            remote_handle: None,
            questions_status: QuestionsStatus::NoHandle,
            registration_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
