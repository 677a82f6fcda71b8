//! Chat session and message storage.

use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use super::Database;
use super::models::{ChatMessage, ChatSession, MessageRole};
use crate::error::{DatabaseError, ServiceResult};

const SESSION_COLUMNS: &str =
    "id, owner_id, session_key, document_ids, title, created_at, updated_at";

const MESSAGE_COLUMNS: &str =
    "id, session_id, role, text, model, tokens_used, source_count, created_at";

impl Database {
    /// Find the session for `(owner, session_key)` or create it.
    ///
    /// The key is the canonical sorted document-id list, so a
    /// comparison chat over `(a, b)` and `(b, a)` lands in the same
    /// session.
    pub fn get_or_create_session(
        &self,
        owner_id: &str,
        session_key: &str,
        document_ids: &[String],
        title: &str,
    ) -> ServiceResult<ChatSession> {
        let conn = self.conn.lock().unwrap();

        let existing = conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM chat_sessions \
                     WHERE owner_id = ?1 AND session_key = ?2"
                ),
                params![owner_id, session_key],
                ChatSession::from_row,
            )
            .optional()
            .map_err(DatabaseError::Query)?;

        if let Some(session) = existing {
            return Ok(session);
        }

        let id = Uuid::new_v4().to_string();
        let document_ids_json =
            serde_json::to_string(document_ids).map_err(|e| crate::error::ServiceError::Internal {
                message: format!("Failed to serialize document ids: {}", e),
            })?;

        conn.execute(
            "INSERT INTO chat_sessions (id, owner_id, session_key, document_ids, title) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, owner_id, session_key, document_ids_json, title],
        )
        .map_err(DatabaseError::Query)?;

        conn.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = ?1"),
            params![id],
            ChatSession::from_row,
        )
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// Look up a session by key without creating it
    pub fn get_session(
        &self,
        owner_id: &str,
        session_key: &str,
    ) -> ServiceResult<Option<ChatSession>> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM chat_sessions \
                 WHERE owner_id = ?1 AND session_key = ?2"
            ),
            params![owner_id, session_key],
            ChatSession::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// Append a message to a session and bump the session's updated_at
    pub fn append_message(
        &self,
        session_id: &str,
        role: MessageRole,
        text: &str,
        model: Option<&str>,
        tokens_used: Option<i64>,
        source_count: Option<i64>,
    ) -> ServiceResult<ChatMessage> {
        let conn = self.conn.lock().unwrap();

        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO chat_messages (id, session_id, role, text, model, tokens_used, source_count) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, session_id, role.as_str(), text, model, tokens_used, source_count],
        )
        .map_err(DatabaseError::Query)?;

        conn.execute(
            "UPDATE chat_sessions SET updated_at = datetime('now') WHERE id = ?1",
            params![session_id],
        )
        .map_err(DatabaseError::Query)?;

        conn.query_row(
            &format!("SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE id = ?1"),
            params![id],
            ChatMessage::from_row,
        )
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// All messages for a session in conversation order
    pub fn list_messages(&self, session_id: &str) -> ServiceResult<Vec<ChatMessage>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM chat_messages \
                 WHERE session_id = ?1 ORDER BY rowid ASC"
            ))
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params![session_id], ChatMessage::from_row)
            .map_err(DatabaseError::Query)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    /// The most recent `window` messages in conversation order. Used to
    /// build the bounded history sent to the remote service.
    pub fn recent_messages(&self, session_id: &str, window: usize) -> ServiceResult<Vec<ChatMessage>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM (\
                     SELECT {MESSAGE_COLUMNS}, rowid AS rid FROM chat_messages \
                     WHERE session_id = ?1 ORDER BY rid DESC LIMIT ?2\
                 ) ORDER BY rid ASC"
            ))
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params![session_id, window as i64], ChatMessage::from_row)
            .map_err(DatabaseError::Query)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_doc_key() -> (&'static str, Vec<String>) {
        ("doc-a|doc-b", vec!["doc-a".to_string(), "doc-b".to_string()])
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let (key, ids) = two_doc_key();

        let first = db
            .get_or_create_session("alice", key, &ids, "Comparison")
            .unwrap();
        let second = db
            .get_or_create_session("alice", key, &ids, "Comparison")
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.document_ids, ids);
        assert!(second.is_comparison());
    }

    #[test]
    fn sessions_are_owner_scoped() {
        let db = Database::open_in_memory().unwrap();
        let (key, ids) = two_doc_key();

        let alice = db
            .get_or_create_session("alice", key, &ids, "Comparison")
            .unwrap();
        let bob = db
            .get_or_create_session("bob", key, &ids, "Comparison")
            .unwrap();
        assert_ne!(alice.id, bob.id);
    }

    #[test]
    fn messages_preserve_conversation_order() {
        let db = Database::open_in_memory().unwrap();
        let session = db
            .get_or_create_session("alice", "doc-a", &["doc-a".to_string()], "Doc A")
            .unwrap();

        for i in 0..4 {
            let role = if i % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };
            db.append_message(&session.id, role, &format!("msg {i}"), None, None, None)
                .unwrap();
        }

        let messages = db.list_messages(&session.id).unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].text, "msg 0");
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[3].text, "msg 3");
        assert_eq!(messages[3].role, MessageRole::Assistant);
    }

    #[test]
    fn recent_messages_returns_tail_in_order() {
        let db = Database::open_in_memory().unwrap();
        let session = db
            .get_or_create_session("alice", "doc-a", &["doc-a".to_string()], "Doc A")
            .unwrap();

        for i in 0..7 {
            db.append_message(
                &session.id,
                MessageRole::User,
                &format!("msg {i}"),
                None,
                None,
                None,
            )
            .unwrap();
        }

        let recent = db.recent_messages(&session.id, 3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].text, "msg 4");
        assert_eq!(recent[2].text, "msg 6");
    }

    #[test]
    fn assistant_metadata_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let session = db
            .get_or_create_session("alice", "doc-a", &["doc-a".to_string()], "Doc A")
            .unwrap();

        let msg = db
            .append_message(
                &session.id,
                MessageRole::Assistant,
                "The answer",
                Some("model-x"),
                Some(321),
                Some(4),
            )
            .unwrap();
        assert_eq!(msg.model.as_deref(), Some("model-x"));
        assert_eq!(msg.tokens_used, Some(321));
        assert_eq!(msg.source_count, Some(4));
    }
}
