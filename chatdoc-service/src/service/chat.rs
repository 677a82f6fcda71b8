//! Chat orchestration over one or two registered documents.
//!
//! Every branch that accepts a user message also persists an assistant
//! message, so the stored conversation never ends on a user turn.

use tracing::{info, warn};

use super::ChatDocService;
use crate::db::{ChatMessage, ChatSession, Document, MessageRole};
use crate::error::{ServiceError, ServiceResult};
use crate::remote::HistoryTurn;

/// Canned reply for a document the remote service cannot answer about
/// yet. Persisted like any other assistant message.
pub const NOT_READY_REPLY: &str =
    "This document is still being processed. Please try again in a moment.";

/// Fallback reply persisted when the remote service errors mid-chat
pub const REMOTE_ERROR_REPLY: &str =
    "Sorry, I couldn't get an answer right now. Please try again.";

/// Result of one chat turn
#[derive(Debug)]
pub struct ChatOutcome {
    pub session: ChatSession,
    pub user_message: ChatMessage,
    pub assistant_message: ChatMessage,
}

/// Canonical session key: sorted document ids joined with `|`, so the
/// same pair always maps to the same session.
pub fn session_key(document_ids: &[String]) -> String {
    let mut ids: Vec<&str> = document_ids.iter().map(String::as_str).collect();
    ids.sort_unstable();
    ids.join("|")
}

impl ChatDocService {
    /// Run one chat turn against one document or a two-document
    /// comparison.
    pub async fn chat(
        &self,
        owner_id: &str,
        document_ids: &[String],
        message: &str,
    ) -> ServiceResult<ChatOutcome> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ServiceError::validation_field(
                "message",
                "Message must not be empty",
            ));
        }

        let documents = self.load_chat_documents(owner_id, document_ids)?;
        let comparison = documents.len() == 2;

        // Comparison requires both documents to be answerable; rejecting
        // up front keeps a half-usable pair from polluting the session.
        if comparison && documents.iter().any(|d| !d.is_registered()) {
            return Err(ServiceError::validation(
                "Both documents must finish processing before they can be compared",
            ));
        }

        let key = session_key(document_ids);
        let title = session_title(&documents);
        let ids: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();
        let session = self
            .db
            .get_or_create_session(owner_id, &key, &ids, &title)?;

        // History is the prior turns only, captured before this message
        let history = self.build_history(&session.id)?;

        let user_message =
            self.db
                .append_message(&session.id, MessageRole::User, message, None, None, None)?;

        // Single document without a handle gets a canned reply instead
        // of a remote call
        if !comparison && !documents[0].is_registered() {
            let assistant_message = self.db.append_message(
                &session.id,
                MessageRole::Assistant,
                NOT_READY_REPLY,
                None,
                None,
                None,
            )?;
            return Ok(ChatOutcome {
                session,
                user_message,
                assistant_message,
            });
        }

        let answer = if comparison {
            let handles: Vec<String> = documents
                .iter()
                .filter_map(|d| d.remote_handle.clone())
                .collect();
            self.remote.compare_chat(&handles, message, &history).await
        } else {
            let handle = documents[0]
                .remote_handle
                .as_deref()
                .unwrap_or_default();
            self.remote.chat(handle, message, &history).await
        };

        let assistant_message = match answer {
            Ok(answer) => {
                info!(
                    session_id = %session.id,
                    tokens = answer.tokens_used.unwrap_or(0),
                    sources = answer.sources.len(),
                    "chat answer received"
                );
                self.db.append_message(
                    &session.id,
                    MessageRole::Assistant,
                    &answer.answer,
                    answer.model.as_deref(),
                    answer.tokens_used,
                    Some(answer.sources.len() as i64),
                )?
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "remote chat failed");
                self.db.append_message(
                    &session.id,
                    MessageRole::Assistant,
                    REMOTE_ERROR_REPLY,
                    None,
                    None,
                    None,
                )?
            }
        };

        Ok(ChatOutcome {
            session,
            user_message,
            assistant_message,
        })
    }

    /// Full conversation history for a document set. Empty when no chat
    /// has happened yet.
    pub fn chat_history(
        &self,
        owner_id: &str,
        document_ids: &[String],
    ) -> ServiceResult<Vec<ChatMessage>> {
        // Validates count and ownership even when no session exists
        self.load_chat_documents(owner_id, document_ids)?;

        let key = session_key(document_ids);
        match self.db.get_session(owner_id, &key)? {
            Some(session) => self.db.list_messages(&session.id),
            None => Ok(Vec::new()),
        }
    }

    /// Validate the document set for a chat: one or two distinct
    /// documents, all owned by the caller.
    fn load_chat_documents(
        &self,
        owner_id: &str,
        document_ids: &[String],
    ) -> ServiceResult<Vec<Document>> {
        match document_ids.len() {
            1 => {}
            2 if document_ids[0] != document_ids[1] => {}
            2 => {
                return Err(ServiceError::validation_field(
                    "document_ids",
                    "Comparison requires two distinct documents",
                ));
            }
            _ => {
                return Err(ServiceError::validation_field(
                    "document_ids",
                    "Chat requires one document, or exactly two for comparison",
                ));
            }
        }

        document_ids
            .iter()
            .map(|id| self.owned_document(owner_id, id))
            .collect()
    }

    fn build_history(&self, session_id: &str) -> ServiceResult<Vec<HistoryTurn>> {
        let recent = self
            .db
            .recent_messages(session_id, self.config.limits.history_window)?;

        Ok(recent
            .into_iter()
            .map(|m| HistoryTurn {
                role: m.role.as_str().to_string(),
                text: m.text,
            })
            .collect())
    }
}

fn session_title(documents: &[Document]) -> String {
    match documents {
        [single] => single.title.clone(),
        [a, b] => format!("{} vs {}", a.title, b.title),
        _ => "Chat".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::make_document;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn session_key_is_order_independent() {
        assert_eq!(
            session_key(&ids(&["doc-b", "doc-a"])),
            session_key(&ids(&["doc-a", "doc-b"]))
        );
        assert_eq!(session_key(&ids(&["doc-a"])), "doc-a");
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_persisting() {
        let (service, _dir) = ChatDocService::for_tests();
        service
            .db
            .insert_document(&make_document("doc-1", "alice"))
            .unwrap();

        let err = service
            .chat("alice", &ids(&["doc-1"]), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation { field: Some("message"), .. }));

        let history = service.chat_history("alice", &ids(&["doc-1"])).unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn document_count_is_validated() {
        let (service, _dir) = ChatDocService::for_tests();

        let err = service.chat("alice", &[], "hello").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));

        let err = service
            .chat("alice", &ids(&["a", "b", "c"]), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));

        let err = service
            .chat("alice", &ids(&["a", "a"]), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));
    }

    #[tokio::test]
    async fn foreign_document_rejection_creates_no_rows() {
        let (service, _dir) = ChatDocService::for_tests();
        service
            .db
            .insert_document(&make_document("doc-1", "alice"))
            .unwrap();

        let err = service
            .chat("bob", &ids(&["doc-1"]), "what is this about?")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DocumentNotFound { .. }));

        // No session was created for either party
        assert!(service.db.get_session("bob", "doc-1").unwrap().is_none());
        assert!(service.db.get_session("alice", "doc-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn unregistered_document_gets_persisted_canned_reply() {
        let (service, _dir) = ChatDocService::for_tests();
        service
            .db
            .insert_document(&make_document("doc-1", "alice"))
            .unwrap();

        let outcome = service
            .chat("alice", &ids(&["doc-1"]), "summarize this")
            .await
            .unwrap();
        assert_eq!(outcome.assistant_message.text, NOT_READY_REPLY);
        assert_eq!(outcome.assistant_message.role, MessageRole::Assistant);

        // Both turns are durable
        let history = service.chat_history("alice", &ids(&["doc-1"])).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[0].text, "summarize this");
        assert_eq!(history[1].text, NOT_READY_REPLY);
    }

    #[tokio::test]
    async fn comparison_with_unregistered_document_is_rejected_before_persisting() {
        let (service, _dir) = ChatDocService::for_tests();
        service
            .db
            .insert_document(&make_document("doc-1", "alice"))
            .unwrap();
        service
            .db
            .insert_document(&make_document("doc-2", "alice"))
            .unwrap();
        service.db.set_remote_handle("doc-1", "h-1").unwrap();

        let err = service
            .chat("alice", &ids(&["doc-1", "doc-2"]), "compare these")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));

        let history = service
            .chat_history("alice", &ids(&["doc-1", "doc-2"]))
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn remote_failure_still_persists_assistant_reply() {
        // The test remote endpoint refuses connections; the turn must
        // settle with the fallback reply instead of an error.
        let (service, _dir) = ChatDocService::for_tests();
        service
            .db
            .insert_document(&make_document("doc-1", "alice"))
            .unwrap();
        service.db.set_remote_handle("doc-1", "h-1").unwrap();

        let outcome = service
            .chat("alice", &ids(&["doc-1"]), "what is the scope?")
            .await
            .unwrap();
        assert_eq!(outcome.assistant_message.text, REMOTE_ERROR_REPLY);

        let history = service.chat_history("alice", &ids(&["doc-1"])).unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn comparison_session_is_shared_across_orderings() {
        let (service, _dir) = ChatDocService::for_tests();
        service
            .db
            .insert_document(&make_document("doc-1", "alice"))
            .unwrap();
        service
            .db
            .insert_document(&make_document("doc-2", "alice"))
            .unwrap();
        service.db.set_remote_handle("doc-1", "h-1").unwrap();
        service.db.set_remote_handle("doc-2", "h-2").unwrap();

        let first = service
            .chat("alice", &ids(&["doc-1", "doc-2"]), "compare")
            .await
            .unwrap();
        let second = service
            .chat("alice", &ids(&["doc-2", "doc-1"]), "and again")
            .await
            .unwrap();
        assert_eq!(first.session.id, second.session.id);

        let history = service
            .chat_history("alice", &ids(&["doc-2", "doc-1"]))
            .unwrap();
        assert_eq!(history.len(), 4);
    }
}
