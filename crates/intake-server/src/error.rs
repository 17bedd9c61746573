//! Ingestion error taxonomy
//!
//! Every failure the orchestrator or a storage engine can produce is one
//! [`IngestError`] variant. A request yields at most one of them, and no
//! partial [`Upload`](crate::ingest::Upload) is ever delivered alongside it.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::{fmt, io, path::PathBuf};
use thiserror::Error;

use crate::api::response::ErrorResponse;

/// Boxed cause carried by errors that wrap a foreign failure
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for ingestion operations
pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Terminal failure of one ingestion
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid `{option}` option: {message}")]
    Configuration { option: String, message: String },

    #[error("Form parsing error: {0}")]
    FormParsing(#[source] BoxError),

    #[error("Request stream error: {0}")]
    RequestStream(#[source] BoxError),

    #[error("File filter failed for `{filename}` in field `{field}`: {cause}")]
    FileFilter {
        filename: String,
        field: String,
        #[source]
        cause: BoxError,
    },

    #[error("{}", size_limit_message(.filename, .field, .limit))]
    FileSizeLimit {
        filename: String,
        field: String,
        /// Configured bound, `None` when the breach was signalled without one
        limit: Option<u64>,
    },

    #[error("Failed to create directory {} for file upload: {cause}", .path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        cause: io::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn size_limit_message(filename: &str, field: &str, limit: &Option<u64>) -> String {
    match limit {
        Some(limit) => format!(
            "File size limit exceeded for `{}` in field `{}` (limit: {} bytes)",
            filename, field, limit
        ),
        None => format!("File size limit exceeded for `{}` in field `{}`", filename, field),
    }
}

impl IngestError {
    pub fn configuration(option: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            option: option.into(),
            message: message.into(),
        }
    }

    /// Stable machine readable code
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Configuration { .. } => "CONFIGURATION_ERROR",
            IngestError::FormParsing(_) => "FORM_PARSING_ERROR",
            IngestError::RequestStream(_) => "REQUEST_STREAM_ERROR",
            IngestError::FileFilter { .. } => "FILE_FILTER_ERROR",
            IngestError::FileSizeLimit { .. } => "FILE_SIZE_LIMIT",
            IngestError::DirectoryCreation { .. } => "DIRECTORY_CREATION_ERROR",
            IngestError::Storage(e) => e.kind.code(),
        }
    }

    /// Whether re-sending the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            IngestError::RequestStream(_) => true,
            IngestError::Storage(e) => e.kind.is_retryable(),
            _ => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestError::FormParsing(_) | IngestError::FileFilter { .. } => StatusCode::BAD_REQUEST,
            IngestError::FileSizeLimit { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            IngestError::RequestStream(_) => StatusCode::BAD_REQUEST,
            IngestError::Storage(e) if e.kind.is_relay() => StatusCode::BAD_GATEWAY,
            IngestError::Configuration { .. }
            | IngestError::DirectoryCreation { .. }
            | IngestError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            IngestError::Configuration { option, .. } => Some(json!({ "option": option })),
            IngestError::FileFilter { filename, field, .. } => {
                Some(json!({ "filename": filename, "field": field }))
            },
            IngestError::FileSizeLimit {
                filename,
                field,
                limit,
            } => {
                let mut details = json!({ "filename": filename, "field": field });
                if let Some(limit) = limit {
                    details["limit"] = json!(limit);
                }
                Some(details)
            },
            IngestError::Storage(e) => Some(json!({
                "kind": e.kind,
                "filename": e.filename,
                "retryable": e.kind.is_retryable(),
            })),
            _ => None,
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Upload failed");
            match &self {
                IngestError::Storage(e) if e.kind.is_relay() => self.to_string(),
                _ => "An internal error occurred while storing the upload".to_string(),
            }
        } else {
            tracing::warn!(code = self.code(), error = %self, "Upload rejected");
            self.to_string()
        };

        let body = match self.details() {
            Some(details) => ErrorResponse::with_details(self.code(), message, details),
            None => ErrorResponse::new(self.code(), message),
        };

        (status, Json(body)).into_response()
    }
}

/// Failure class of a [`StorageError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageErrorKind {
    /// Reading a part into memory failed
    Memory,
    /// Writing a part to disk failed
    Disk,
    /// Removing a stored file failed
    Deletion,
    /// The relay endpoint could not be reached in time
    Connection,
    /// The part stream failed while relaying
    RelayRead,
    /// The relay socket failed or timed out mid-transfer
    RelayWrite,
}

impl StorageErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            StorageErrorKind::Memory => "MEMORY_STORAGE_ERROR",
            StorageErrorKind::Disk => "DISK_STORAGE_ERROR",
            StorageErrorKind::Deletion => "FILE_DELETION_ERROR",
            StorageErrorKind::Connection => "RELAY_CONNECTION_ERROR",
            StorageErrorKind::RelayRead => "RELAY_READ_ERROR",
            StorageErrorKind::RelayWrite => "RELAY_WRITE_ERROR",
        }
    }

    /// Nothing left the process yet, so the same bytes can be sent again.
    pub fn is_retryable(self) -> bool {
        matches!(self, StorageErrorKind::Connection)
    }

    fn is_relay(self) -> bool {
        matches!(
            self,
            StorageErrorKind::Connection | StorageErrorKind::RelayRead | StorageErrorKind::RelayWrite
        )
    }
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageErrorKind::Memory => "memory",
            StorageErrorKind::Disk => "disk",
            StorageErrorKind::Deletion => "deletion",
            StorageErrorKind::Connection => "connection",
            StorageErrorKind::RelayRead => "relay-read",
            StorageErrorKind::RelayWrite => "relay-write",
        };
        f.write_str(name)
    }
}

/// Failure reported by a storage engine
#[derive(Error, Debug)]
#[error("{message}{}", .cause.as_ref().map(|c| format!(": {}", c)).unwrap_or_default())]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
    /// Client filename of the part being stored, if known
    pub filename: Option<String>,
    #[source]
    pub cause: Option<BoxError>,
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            filename: None,
            cause: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

/// Which configured bound a [`LimitExceeded`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    FileSize,
    FieldSize,
    Files,
    Fields,
    Parts,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LimitKind::FileSize => "file size",
            LimitKind::FieldSize => "field size",
            LimitKind::Files => "file count",
            LimitKind::Fields => "field count",
            LimitKind::Parts => "part count",
        };
        f.write_str(name)
    }
}

/// A part or request crossed one of the configured limits
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} limit of {max} exceeded{}", .field.as_ref().map(|f| format!(" by field `{}`", f)).unwrap_or_default())]
pub struct LimitExceeded {
    pub kind: LimitKind,
    pub max: u64,
    pub field: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_limit_message_without_bound() {
        let err = IngestError::FileSizeLimit {
            filename: "big.iso".to_string(),
            field: "image".to_string(),
            limit: None,
        };
        let message = err.to_string();
        assert!(message.contains("big.iso"));
        assert!(!message.contains("limit:"));
        assert_eq!(err.code(), "FILE_SIZE_LIMIT");
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_size_limit_message_with_bound() {
        let err = IngestError::FileSizeLimit {
            filename: "big.iso".to_string(),
            field: "image".to_string(),
            limit: Some(1024),
        };
        assert!(err.to_string().contains("limit: 1024 bytes"));
    }

    #[test]
    fn test_storage_codes_and_retry() {
        let connection: IngestError =
            StorageError::new(StorageErrorKind::Connection, "Failed to connect").into();
        assert_eq!(connection.code(), "RELAY_CONNECTION_ERROR");
        assert!(connection.is_retryable());
        assert_eq!(connection.status_code(), StatusCode::BAD_GATEWAY);

        let write: IngestError =
            StorageError::new(StorageErrorKind::RelayWrite, "Socket closed").into();
        assert!(!write.is_retryable());

        let deletion: IngestError =
            StorageError::new(StorageErrorKind::Deletion, "Failed to delete").into();
        assert_eq!(deletion.code(), "FILE_DELETION_ERROR");
        assert_eq!(deletion.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_storage_error_display_includes_cause() {
        let err = StorageError::new(StorageErrorKind::Disk, "Failed to write file to disk")
            .with_filename("a.txt")
            .with_cause(io::Error::new(io::ErrorKind::Other, "disk full"));
        assert_eq!(err.to_string(), "Failed to write file to disk: disk full");
        assert_eq!(err.kind.to_string(), "disk");
    }

    #[test]
    fn test_limit_exceeded_display() {
        let err = LimitExceeded {
            kind: LimitKind::FieldSize,
            max: 16,
            field: Some("bio".to_string()),
        };
        assert_eq!(err.to_string(), "field size limit of 16 exceeded by field `bio`");
    }

    #[test]
    fn test_request_stream_is_retryable() {
        let err = IngestError::RequestStream("connection reset".into());
        assert!(err.is_retryable());
        assert_eq!(err.code(), "REQUEST_STREAM_ERROR");
    }
}
