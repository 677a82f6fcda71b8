use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Also returned for documents owned by someone else, so callers
    /// cannot tell a foreign document from a missing one.
    #[error("Document not found: {document_id}")]
    DocumentNotFound { document_id: String },

    #[error("Invalid request: {message}")]
    Validation {
        field: Option<&'static str>,
        message: String,
    },

    #[error("Remote processing service error")]
    Remote(#[from] RemoteError),

    #[error("Database error")]
    Database(#[from] DatabaseError),

    #[error("Text extraction failed")]
    Extraction(#[from] ExtractionError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation {
            field: None,
            message: message.into(),
        }
    }

    pub fn validation_field(field: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Validation {
            field: Some(field),
            message: message.into(),
        }
    }
}

/// Errors talking to the remote processing service
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Connection failed to remote service at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Remote call to {url} timed out")]
    Timeout { url: String },

    #[error("Remote service returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response from remote service")]
    InvalidResponse {
        #[source]
        source: reqwest::Error,
    },
}

impl RemoteError {
    /// Transient errors are retryable; the caller should surface a
    /// generic "try again" failure rather than a terminal one.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Connection { .. } | RemoteError::Timeout { .. } => true,
            RemoteError::Status { status, .. } => *status >= 500,
            RemoteError::InvalidResponse { .. } => false,
        }
    }
}

/// Database errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed")]
    Connection(#[source] rusqlite::Error),

    #[error("Query failed")]
    Query(#[source] rusqlite::Error),

    #[error("Migration failed: {message}")]
    Migration { message: String },
}

/// Local text extraction errors
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to parse PDF: {message}")]
    Parse { message: String },

    #[error("No text could be extracted")]
    Empty,

    #[error("IO error")]
    Io(#[source] std::io::Error),
}

/// API error envelope. Every failure path returns this shape so polling
/// clients can always distinguish "keep waiting" from "stop and show
/// the error".
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::DocumentNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::Validation { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Remote(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::DocumentNotFound { .. } => "document_not_found",
            ServiceError::Validation { .. } => "invalid_request",
            ServiceError::Remote(RemoteError::Timeout { .. }) => "remote_timeout",
            ServiceError::Remote(RemoteError::Connection { .. }) => "remote_unavailable",
            ServiceError::Remote(RemoteError::Status { .. }) => "remote_error",
            ServiceError::Remote(RemoteError::InvalidResponse { .. }) => "remote_invalid_response",
            ServiceError::Database(_) => "database_error",
            ServiceError::Extraction(_) => "extraction_error",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();
        let field = match &self {
            ServiceError::Validation { field, .. } => *field,
            _ => None,
        };

        let response = ErrorResponse {
            success: false,
            message: self.to_string(),
            code,
            field,
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_and_missing_documents_are_indistinguishable() {
        // Both cases must produce the same error variant and code.
        let missing = ServiceError::DocumentNotFound {
            document_id: "a".into(),
        };
        let foreign = ServiceError::DocumentNotFound {
            document_id: "b".into(),
        };
        assert_eq!(missing.error_code(), foreign.error_code());
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn transient_classification() {
        assert!(
            RemoteError::Timeout {
                url: "http://x".into()
            }
            .is_transient()
        );
        assert!(
            RemoteError::Status {
                status: 503,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            !RemoteError::Status {
                status: 422,
                message: String::new()
            }
            .is_transient()
        );
    }
}
