//! Question-readiness tracking.
//!
//! Both the bounded interactive poll and the background worker feed
//! remote poll responses through one pure transition function, and both
//! serialize on a per-document lock, so a document's questions settle
//! exactly once no matter who observes readiness first.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::ChatDocService;
use crate::db::{Document, QuestionsStatus, QuickQuestion};
use crate::error::{ServiceError, ServiceResult};
use crate::remote::{PollQuestionsResponse, RemoteJobStatus, RemoteQuestion};

/// What a poll response means for a document's current status
#[derive(Debug)]
pub enum QuestionTransition {
    /// Keep polling; nothing changed
    StillPending,
    /// Store this set and mark the document ready
    BecameReady(Vec<RemoteQuestion>),
    /// Mark the document failed with this message
    BecameFailed(String),
    /// The document already settled; discard the response
    AlreadySettled,
}

/// Result of an interactive wait for questions
#[derive(Debug)]
pub enum WaitOutcome {
    Ready { questions: Vec<QuickQuestion> },
    Failed { message: String },
    /// The interactive budget ran out; the background worker keeps
    /// polling.
    StillPending { attempts: u32, elapsed_secs: u64 },
    /// No remote handle, so there is nothing to poll
    NotRegistered,
}

/// Decide what a poll response does to a document in `current` state.
///
/// Settled states never regress: a stale `pending` response after the
/// questions were stored is discarded. A `ready` response with an empty
/// question list is treated as still pending, the remote service
/// reports ready before the set is durable in rare cases.
pub fn apply_poll_response(
    current: QuestionsStatus,
    response: &PollQuestionsResponse,
) -> QuestionTransition {
    if current.is_settled() {
        return QuestionTransition::AlreadySettled;
    }

    match response.status {
        RemoteJobStatus::Pending => QuestionTransition::StillPending,
        RemoteJobStatus::Ready => {
            if response.questions.is_empty() {
                QuestionTransition::StillPending
            } else {
                QuestionTransition::BecameReady(response.questions.clone())
            }
        }
        RemoteJobStatus::Failed => QuestionTransition::BecameFailed(
            response
                .error
                .clone()
                .unwrap_or_else(|| "Question generation failed".to_string()),
        ),
    }
}

impl ChatDocService {
    /// Poll the remote service once for a document and apply the result.
    ///
    /// Holds the document's poll lock across the read-poll-store
    /// sequence. Returns the status after the poll.
    pub async fn poll_document_questions(&self, document: &Document) -> ServiceResult<QuestionsStatus> {
        if document.remote_handle.is_none() {
            return Ok(QuestionsStatus::NoHandle);
        }

        let lock = self.poll_lock(&document.id);
        let _guard = lock.lock().await;

        // Re-read under the lock: another poller may have settled the
        // document, and a regenerate may have swapped the handle. The
        // caller's snapshot is only trusted for the id.
        let fresh = match self.db.get_document(&document.id)? {
            Some(doc) => doc,
            None => return Ok(QuestionsStatus::NoHandle),
        };
        let handle = match &fresh.remote_handle {
            Some(handle) => handle.clone(),
            None => return Ok(QuestionsStatus::NoHandle),
        };
        let current = fresh.questions_status;
        if current.is_settled() {
            return Ok(current);
        }

        let response = self.remote.poll_questions(&handle).await?;

        match apply_poll_response(current, &response) {
            QuestionTransition::StillPending => Ok(QuestionsStatus::Pending),
            QuestionTransition::BecameReady(questions) => {
                self.store_ready_questions(&document.id, &questions)?;
                Ok(QuestionsStatus::Ready)
            }
            QuestionTransition::BecameFailed(message) => {
                warn!(doc_id = %document.id, error = %message, "question generation failed");
                self.db
                    .set_questions_status(&document.id, QuestionsStatus::Failed)?;
                Ok(QuestionsStatus::Failed)
            }
            QuestionTransition::AlreadySettled => Ok(current),
        }
    }

    /// Store a ready question set and mark the document ready. The
    /// stored set fully replaces whatever was there before.
    fn store_ready_questions(
        &self,
        document_id: &str,
        questions: &[RemoteQuestion],
    ) -> ServiceResult<()> {
        let pairs: Vec<(String, String)> = questions
            .iter()
            .map(|q| (q.title.clone(), q.question.clone()))
            .collect();

        self.db.replace_questions(document_id, &pairs, "auto")?;
        self.db
            .set_questions_status(document_id, QuestionsStatus::Ready)?;
        info!(doc_id = %document_id, count = questions.len(), "quick questions ready");

        Ok(())
    }

    /// Bounded interactive wait: poll until the questions settle or the
    /// attempt budget runs out. Transient remote errors consume an
    /// attempt and the wait continues.
    pub async fn wait_for_questions(&self, owner_id: &str, document_id: &str) -> ServiceResult<WaitOutcome> {
        let document = self.owned_document(owner_id, document_id)?;

        if document.remote_handle.is_none() {
            return Ok(WaitOutcome::NotRegistered);
        }

        if document.questions_status == QuestionsStatus::Ready {
            return Ok(WaitOutcome::Ready {
                questions: self.db.list_questions(&document.id)?,
            });
        }

        let started = Instant::now();
        let max_attempts = self.config.polling.max_attempts;

        for attempt in 1..=max_attempts {
            match self.poll_document_questions(&document).await {
                Ok(QuestionsStatus::Ready) => {
                    return Ok(WaitOutcome::Ready {
                        questions: self.db.list_questions(&document.id)?,
                    });
                }
                Ok(QuestionsStatus::Failed) => {
                    return Ok(WaitOutcome::Failed {
                        message: "Question generation failed".to_string(),
                    });
                }
                Ok(_) => {
                    debug!(doc_id = %document.id, attempt, "questions still pending");
                }
                Err(ServiceError::Remote(e)) if e.is_transient() => {
                    // The remote service hiccuped; keep waiting
                    debug!(doc_id = %document.id, attempt, error = %e, "transient poll error");
                }
                Err(e) => return Err(e),
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.config.polling.interval()).await;
            }
        }

        Ok(WaitOutcome::StillPending {
            attempts: max_attempts,
            elapsed_secs: started.elapsed().as_secs(),
        })
    }

    /// Quick questions currently stored for a document
    pub fn list_questions(&self, owner_id: &str, document_id: &str) -> ServiceResult<Vec<QuickQuestion>> {
        let document = self.owned_document(owner_id, document_id)?;
        self.db.list_questions(&document.id)
    }
}

/// Background worker: re-arms readiness polling for every document left
/// pending after its interactive budget ran out. Runs until the process
/// exits.
pub fn start_readiness_worker(service: Arc<ChatDocService>) {
    let interval = service.config.polling.background_interval();

    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "readiness worker started");

        loop {
            tokio::time::sleep(interval).await;

            let pending = match service.db.list_pending_question_documents() {
                Ok(docs) => docs,
                Err(e) => {
                    error!(error = %e, "readiness worker failed to list pending documents");
                    continue;
                }
            };

            for document in pending {
                match service.poll_document_questions(&document).await {
                    Ok(status) => {
                        debug!(doc_id = %document.id, status = status.as_str(), "background poll");
                    }
                    Err(e) => {
                        debug!(doc_id = %document.id, error = %e, "background poll error");
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::make_document;

    fn response(status: RemoteJobStatus, questions: Vec<RemoteQuestion>) -> PollQuestionsResponse {
        PollQuestionsResponse {
            status,
            questions,
            error: None,
        }
    }

    fn sample_questions(n: usize) -> Vec<RemoteQuestion> {
        (0..n)
            .map(|i| RemoteQuestion {
                title: format!("Topic {i}"),
                question: format!("What about topic {i}?"),
            })
            .collect()
    }

    #[test]
    fn pending_response_keeps_waiting() {
        let transition = apply_poll_response(
            QuestionsStatus::Pending,
            &response(RemoteJobStatus::Pending, vec![]),
        );
        assert!(matches!(transition, QuestionTransition::StillPending));
    }

    #[test]
    fn ready_with_questions_settles() {
        let transition = apply_poll_response(
            QuestionsStatus::Pending,
            &response(RemoteJobStatus::Ready, sample_questions(3)),
        );
        match transition {
            QuestionTransition::BecameReady(questions) => assert_eq!(questions.len(), 3),
            other => panic!("unexpected transition: {other:?}"),
        }
    }

    #[test]
    fn ready_with_empty_set_is_still_pending() {
        let transition = apply_poll_response(
            QuestionsStatus::Pending,
            &response(RemoteJobStatus::Ready, vec![]),
        );
        assert!(matches!(transition, QuestionTransition::StillPending));
    }

    #[test]
    fn failed_response_carries_message() {
        let mut resp = response(RemoteJobStatus::Failed, vec![]);
        resp.error = Some("model exploded".to_string());

        match apply_poll_response(QuestionsStatus::Pending, &resp) {
            QuestionTransition::BecameFailed(message) => assert_eq!(message, "model exploded"),
            other => panic!("unexpected transition: {other:?}"),
        }
    }

    #[test]
    fn settled_states_never_regress() {
        // A stale pending response after READY must not reopen polling
        for settled in [QuestionsStatus::Ready, QuestionsStatus::Failed] {
            for status in [
                RemoteJobStatus::Pending,
                RemoteJobStatus::Ready,
                RemoteJobStatus::Failed,
            ] {
                let transition =
                    apply_poll_response(settled, &response(status, sample_questions(2)));
                assert!(
                    matches!(transition, QuestionTransition::AlreadySettled),
                    "{settled:?} regressed on {status:?}"
                );
            }
        }
    }

    #[tokio::test]
    async fn wait_without_handle_reports_not_registered() {
        let (service, _dir) = ChatDocService::for_tests();
        service
            .db
            .insert_document(&make_document("doc-1", "alice"))
            .unwrap();

        let outcome = service.wait_for_questions("alice", "doc-1").await.unwrap();
        assert!(matches!(outcome, WaitOutcome::NotRegistered));
    }

    #[tokio::test]
    async fn wait_is_owner_scoped() {
        let (service, _dir) = ChatDocService::for_tests();
        service
            .db
            .insert_document(&make_document("doc-1", "alice"))
            .unwrap();

        let err = service
            .wait_for_questions("bob", "doc-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DocumentNotFound { .. }));
    }

    #[tokio::test]
    async fn already_ready_returns_stored_questions_without_polling() {
        // The remote endpoint is unreachable; a ready document must not
        // need it.
        let (service, _dir) = ChatDocService::for_tests();
        service
            .db
            .insert_document(&make_document("doc-1", "alice"))
            .unwrap();
        service.db.set_remote_handle("doc-1", "h-1").unwrap();
        service
            .store_ready_questions("doc-1", &sample_questions(4))
            .unwrap();

        let outcome = service.wait_for_questions("alice", "doc-1").await.unwrap();
        match outcome {
            WaitOutcome::Ready { questions } => {
                assert_eq!(questions.len(), 4);
                assert_eq!(questions[0].title, "Topic 0");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn poll_stores_ready_set_from_remote() {
        let url = crate::service::stub_remote::spawn(|_method, _path| {
            r#"{"status":"ready","questions":[
                {"title":"Scope","question":"What does it cover?"},
                {"title":"Term","question":"How long does it run?"}
            ]}"#
            .to_string()
        })
        .await;
        let (service, _dir) = ChatDocService::for_tests_with_remote(&url);
        service
            .db
            .insert_document(&make_document("doc-1", "alice"))
            .unwrap();
        service.db.set_remote_handle("doc-1", "h-1").unwrap();
        let document = service.db.get_document("doc-1").unwrap().unwrap();

        let status = service.poll_document_questions(&document).await.unwrap();
        assert_eq!(status, QuestionsStatus::Ready);
        assert_eq!(service.db.count_questions("doc-1").unwrap(), 2);
    }

    #[tokio::test]
    async fn poll_with_stale_snapshot_uses_the_current_handle() {
        // The remote answers ready for the old handle and pending for
        // the new one. A poller holding a snapshot from before the
        // handle swap must not settle the document with the old set.
        let url = crate::service::stub_remote::spawn(|_method, path| {
            if path == "/questions/h-old" {
                r#"{"status":"ready","questions":[{"title":"Old","question":"Old set?"}]}"#
                    .to_string()
            } else {
                r#"{"status":"pending"}"#.to_string()
            }
        })
        .await;
        let (service, _dir) = ChatDocService::for_tests_with_remote(&url);
        service
            .db
            .insert_document(&make_document("doc-1", "alice"))
            .unwrap();
        service.db.set_remote_handle("doc-1", "h-old").unwrap();
        let stale = service.db.get_document("doc-1").unwrap().unwrap();

        // Handle swapped, as a regenerate would do
        service.db.set_remote_handle("doc-1", "h-new").unwrap();

        let status = service.poll_document_questions(&stale).await.unwrap();
        assert_eq!(status, QuestionsStatus::Pending);
        assert_eq!(service.db.count_questions("doc-1").unwrap(), 0);
        assert_eq!(
            service
                .db
                .get_document("doc-1")
                .unwrap()
                .unwrap()
                .questions_status,
            QuestionsStatus::Pending
        );
    }

    #[tokio::test]
    async fn stored_questions_replace_previous_set() {
        let (service, _dir) = ChatDocService::for_tests();
        service
            .db
            .insert_document(&make_document("doc-1", "alice"))
            .unwrap();
        service.db.set_remote_handle("doc-1", "h-1").unwrap();

        service
            .store_ready_questions("doc-1", &sample_questions(5))
            .unwrap();
        service
            .store_ready_questions("doc-1", &sample_questions(2))
            .unwrap();

        assert_eq!(service.db.count_questions("doc-1").unwrap(), 2);
    }
}
