//! Database model structs.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Document lifecycle status.
///
/// Advances forward only: `Uploaded -> TextExtracted -> Registered`.
/// `RegisterFailed` is the retryable exception; a manual retry moves it
/// back onto the forward path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// File stored, nothing else done yet
    Uploaded,
    /// Local or OCR extraction filled in text and page count
    TextExtracted,
    /// Remote service accepted the document and returned a handle
    Registered,
    /// Registration failed; retryable via the retry endpoint
    RegisterFailed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::TextExtracted => "text_extracted",
            DocumentStatus::Registered => "registered",
            DocumentStatus::RegisterFailed => "register_failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "text_extracted" => DocumentStatus::TextExtracted,
            "registered" => DocumentStatus::Registered,
            "register_failed" => DocumentStatus::RegisterFailed,
            _ => DocumentStatus::Uploaded,
        }
    }
}

/// Quick-question generation status for a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionsStatus {
    /// Registration never completed; terminal until manual retry
    #[default]
    NoHandle,
    /// Remote generation in flight, polls are meaningful
    Pending,
    /// Questions stored; terminal until explicit regenerate
    Ready,
    /// Remote reported failure; terminal until explicit regenerate
    Failed,
}

impl QuestionsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionsStatus::NoHandle => "no_handle",
            QuestionsStatus::Pending => "pending",
            QuestionsStatus::Ready => "ready",
            QuestionsStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => QuestionsStatus::Pending,
            "ready" => QuestionsStatus::Ready,
            "failed" => QuestionsStatus::Failed,
            _ => QuestionsStatus::NoHandle,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, QuestionsStatus::Ready | QuestionsStatus::Failed)
    }
}

/// Document record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub original_filename: String,
    pub storage_path: String,
    pub byte_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<i64>,
    /// Null when both local parsing and OCR failed; downstream stages
    /// tolerate this.
    #[serde(skip)]
    pub extracted_text: Option<String>,
    pub ocr_used: bool,
    pub content_hash: String,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_handle: Option<String>,
    pub questions_status: QuestionsStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let byte_size: i64 = row.get(5)?;
        let status_str: String = row.get(10)?;
        let questions_status_str: String = row.get(12)?;
        let created_at_str: String = row.get(14)?;
        let updated_at_str: String = row.get(15)?;

        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            original_filename: row.get(3)?,
            storage_path: row.get(4)?,
            byte_size: byte_size as u64,
            page_count: row.get(6)?,
            extracted_text: row.get(7)?,
            ocr_used: row.get(8)?,
            content_hash: row.get(9)?,
            status: DocumentStatus::from_str(&status_str),
            remote_handle: row.get(11)?,
            questions_status: QuestionsStatus::from_str(&questions_status_str),
            registration_error: row.get(13)?,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }

    /// True once the remote service can answer questions about this
    /// document.
    pub fn is_registered(&self) -> bool {
        self.remote_handle.is_some()
    }
}

/// Auto-generated quick-question record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickQuestion {
    pub id: String,
    pub document_id: String,
    pub title: String,
    pub question_text: String,
    pub source_tag: String,
    pub created_at: DateTime<Utc>,
}

impl QuickQuestion {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let created_at_str: String = row.get(5)?;

        Ok(Self {
            id: row.get(0)?,
            document_id: row.get(1)?,
            title: row.get(2)?,
            question_text: row.get(3)?,
            source_tag: row.get(4)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }
}

/// Chat session record.
///
/// Identity is `(owner_id, session_key)` where the key is the canonical
/// sorted document-id pair, so a comparison session is found regardless
/// of the order the documents were requested in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub owner_id: String,
    pub session_key: String,
    pub document_ids: Vec<String>,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let document_ids_json: String = row.get(3)?;
        let created_at_str: String = row.get(5)?;
        let updated_at_str: String = row.get(6)?;

        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            session_key: row.get(2)?,
            document_ids: serde_json::from_str(&document_ids_json).unwrap_or_default(),
            title: row.get(4)?,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }

    pub fn is_comparison(&self) -> bool {
        self.document_ids.len() == 2
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "user" => MessageRole::User,
            _ => MessageRole::Assistant,
        }
    }
}

/// Chat message record. Append-only; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_count: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let role_str: String = row.get(2)?;
        let created_at_str: String = row.get(7)?;

        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            role: MessageRole::from_str(&role_str),
            text: row.get(3)?,
            model: row.get(4)?,
            tokens_used: row.get(5)?,
            source_count: row.get(6)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }
}

/// Rows written by the service carry rfc3339 timestamps; rows that got
/// the SQLite `datetime('now')` default carry the second form.
fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}
