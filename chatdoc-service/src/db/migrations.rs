//! Database schema migrations.

use rusqlite::Connection;

use crate::error::{DatabaseError, ServiceResult};

/// Run all database migrations.
///
/// Called during database initialization to ensure the schema is up to
/// date.
pub(super) fn run_migrations(conn: &Connection) -> ServiceResult<()> {
    conn.execute_batch(
        r#"
        -- Documents table
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL,
            original_filename TEXT NOT NULL,
            storage_path TEXT NOT NULL,
            byte_size INTEGER NOT NULL,
            page_count INTEGER,
            extracted_text TEXT,
            ocr_used INTEGER NOT NULL DEFAULT 0,
            content_hash TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'uploaded',
            remote_handle TEXT,
            questions_status TEXT NOT NULL DEFAULT 'no_handle',
            registration_error TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id);
        CREATE INDEX IF NOT EXISTS idx_documents_questions_status
            ON documents(questions_status);

        -- Auto-generated quick questions. Replaced wholesale on
        -- regeneration, never partially updated.
        CREATE TABLE IF NOT EXISTS quick_questions (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            title TEXT NOT NULL,
            question_text TEXT NOT NULL,
            source_tag TEXT NOT NULL DEFAULT 'auto',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_quick_questions_document
            ON quick_questions(document_id);

        -- Chat sessions, one per (owner, canonical document set)
        CREATE TABLE IF NOT EXISTS chat_sessions (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            session_key TEXT NOT NULL,
            document_ids TEXT NOT NULL,
            title TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(owner_id, session_key)
        );

        CREATE INDEX IF NOT EXISTS idx_chat_sessions_owner ON chat_sessions(owner_id);

        -- Chat messages, append-only; creation order is conversation order
        CREATE TABLE IF NOT EXISTS chat_messages (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            role TEXT NOT NULL,
            text TEXT NOT NULL,
            model TEXT,
            tokens_used INTEGER,
            source_count INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (session_id) REFERENCES chat_sessions(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_chat_messages_session
            ON chat_messages(session_id, created_at);
    "#,
    )
    .map_err(|e| DatabaseError::Migration {
        message: e.to_string(),
    })?;

    run_role_vocabulary_migration(conn)?;

    Ok(())
}

/// Migration: convert legacy `sender`-vocabulary messages to the
/// role-based one. Earlier deployments stored `sender` values of
/// `human`/`bot`; the role column is the single vocabulary going
/// forward.
fn run_role_vocabulary_migration(conn: &Connection) -> ServiceResult<()> {
    conn.execute_batch(
        r#"
        UPDATE chat_messages SET role = 'user' WHERE role = 'human';
        UPDATE chat_messages SET role = 'assistant' WHERE role = 'bot';
        "#,
    )
    .map_err(|e| DatabaseError::Migration {
        message: format!("Failed to migrate message role vocabulary: {}", e),
    })?;

    Ok(())
}
