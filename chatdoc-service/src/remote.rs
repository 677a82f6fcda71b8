//! Client for the remote document-processing service.
//!
//! The remote side owns indexing, quick-question generation, OCR, and
//! retrieval-augmented answering. This service only ever talks to it
//! through the handle returned at registration.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::config::RemoteConfig;
use crate::error::{RemoteError, ServiceError, ServiceResult};

/// Remote processing service client
#[derive(Clone)]
pub struct RemoteClient {
    client: Client,
    config: RemoteConfig,
}

/// Question-generation job status as reported by the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteJobStatus {
    Pending,
    Ready,
    Failed,
}

/// One generated question as the remote service delivers it
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteQuestion {
    pub title: String,
    pub question: String,
}

/// Response to a question poll
#[derive(Debug, Clone, Deserialize)]
pub struct PollQuestionsResponse {
    pub status: RemoteJobStatus,
    #[serde(default)]
    pub questions: Vec<RemoteQuestion>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One turn of prior conversation, sent along with a chat request
#[derive(Debug, Clone, Serialize)]
pub struct HistoryTurn {
    pub role: String,
    pub text: String,
}

/// Answer from the remote service for a chat or comparison request
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteAnswer {
    pub answer: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tokens_used: Option<i64>,
    #[serde(default)]
    pub sources: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    handle: String,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    text: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    handle: &'a str,
    message: &'a str,
    history: &'a [HistoryTurn],
}

#[derive(Serialize)]
struct CompareChatRequest<'a> {
    handles: &'a [String],
    message: &'a str,
    history: &'a [HistoryTurn],
}

impl RemoteClient {
    /// Create a new remote client.
    ///
    /// No client-wide timeout is set; each call carries its own budget
    /// since registration legitimately takes far longer than a poll.
    pub fn new(config: RemoteConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                ServiceError::Remote(RemoteError::Connection {
                    url: config.base_url.clone(),
                    source: e,
                })
            })?;

        Ok(Self { client, config })
    }

    /// Check if the remote service is reachable
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.config.base_url);

        match self
            .client
            .get(&url)
            .timeout(self.config.poll_timeout())
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "remote service health check failed");
                false
            }
        }
    }

    /// Register a document for processing. The remote service ingests
    /// the file and starts question generation; the returned handle is
    /// the key for all later calls.
    pub async fn register(&self, file_bytes: Vec<u8>, filename: &str) -> ServiceResult<String> {
        let url = format!("{}/register", self.config.base_url);

        let part = reqwest::multipart::Part::bytes(file_bytes)
            .file_name(filename.to_string())
            .mime_str("application/pdf")
            .map_err(|e| RemoteError::Connection {
                url: url.clone(),
                source: e,
            })?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(self.config.register_timeout())
            .send()
            .await
            .map_err(|e| map_send_error(e, &url))?;

        let response = check_status(response).await?;

        let body: RegisterResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse { source: e })?;

        Ok(body.handle)
    }

    /// OCR fallback: ask the remote service to extract text from a
    /// scanned PDF
    pub async fn extract_text(&self, file_bytes: Vec<u8>, filename: &str) -> ServiceResult<String> {
        let url = format!("{}/extract", self.config.base_url);

        let part = reqwest::multipart::Part::bytes(file_bytes)
            .file_name(filename.to_string())
            .mime_str("application/pdf")
            .map_err(|e| RemoteError::Connection {
                url: url.clone(),
                source: e,
            })?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(self.config.extract_timeout())
            .send()
            .await
            .map_err(|e| map_send_error(e, &url))?;

        let response = check_status(response).await?;

        let body: ExtractResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse { source: e })?;

        Ok(body.text)
    }

    /// Poll question-generation progress for a handle
    pub async fn poll_questions(&self, handle: &str) -> ServiceResult<PollQuestionsResponse> {
        let url = format!("{}/questions/{}", self.config.base_url, handle);

        let response = self
            .client
            .get(&url)
            .timeout(self.config.poll_timeout())
            .send()
            .await
            .map_err(|e| map_send_error(e, &url))?;

        let response = check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse { source: e })
            .map_err(Into::into)
    }

    /// Ask a question against a single registered document
    pub async fn chat(
        &self,
        handle: &str,
        message: &str,
        history: &[HistoryTurn],
    ) -> ServiceResult<RemoteAnswer> {
        let url = format!("{}/chat", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .json(&ChatRequest {
                handle,
                message,
                history,
            })
            .timeout(self.config.chat_timeout())
            .send()
            .await
            .map_err(|e| map_send_error(e, &url))?;

        let response = check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse { source: e })
            .map_err(Into::into)
    }

    /// Ask a question across exactly two registered documents
    pub async fn compare_chat(
        &self,
        handles: &[String],
        message: &str,
        history: &[HistoryTurn],
    ) -> ServiceResult<RemoteAnswer> {
        let url = format!("{}/compare_chat", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .json(&CompareChatRequest {
                handles,
                message,
                history,
            })
            .timeout(self.config.chat_timeout())
            .send()
            .await
            .map_err(|e| map_send_error(e, &url))?;

        let response = check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse { source: e })
            .map_err(Into::into)
    }
}

fn map_send_error(e: reqwest::Error, url: &str) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout {
            url: url.to_string(),
        }
    } else {
        RemoteError::Connection {
            url: url.to_string(),
            source: e,
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_response_parses_ready_payload() {
        let json = r#"{
            "status": "ready",
            "questions": [
                {"title": "Scope", "question": "What is the scope of the agreement?"},
                {"title": "Term", "question": "How long does the agreement run?"}
            ]
        }"#;

        let parsed: PollQuestionsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.status, RemoteJobStatus::Ready);
        assert_eq!(parsed.questions.len(), 2);
        assert_eq!(parsed.questions[0].title, "Scope");
    }

    #[test]
    fn poll_response_tolerates_missing_questions() {
        let parsed: PollQuestionsResponse =
            serde_json::from_str(r#"{"status": "pending"}"#).unwrap();
        assert_eq!(parsed.status, RemoteJobStatus::Pending);
        assert!(parsed.questions.is_empty());
        assert!(parsed.error.is_none());

        let failed: PollQuestionsResponse =
            serde_json::from_str(r#"{"status": "failed", "error": "ocr crashed"}"#).unwrap();
        assert_eq!(failed.status, RemoteJobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("ocr crashed"));
    }

    #[test]
    fn answer_parses_with_and_without_metadata() {
        let full: RemoteAnswer = serde_json::from_str(
            r#"{"answer": "Yes.", "model": "m1", "tokens_used": 42, "sources": [{"page": 3}]}"#,
        )
        .unwrap();
        assert_eq!(full.answer, "Yes.");
        assert_eq!(full.tokens_used, Some(42));
        assert_eq!(full.sources.len(), 1);

        let bare: RemoteAnswer = serde_json::from_str(r#"{"answer": "No."}"#).unwrap();
        assert!(bare.model.is_none());
        assert!(bare.sources.is_empty());
    }

    #[tokio::test]
    async fn unreachable_service_maps_to_connection_error() {
        let client = RemoteClient::new(RemoteConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..RemoteConfig::default()
        })
        .unwrap();

        let err = client.poll_questions("h-1").await.unwrap_err();
        match err {
            ServiceError::Remote(remote) => assert!(remote.is_transient()),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
