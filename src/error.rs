//! Error types for the poll core.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use crate::models::PollId;

/// Failures raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("poll not found: {0}")]
    NotFound(PollId),

    #[error("option index {index} out of range for poll with {len} options")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("option index must be non-negative, got {0}")]
    NegativeIndex(i64),

    #[error("stored data is corrupted: {0}")]
    Corrupt(String),

    #[error("in-memory store lock poisoned")]
    LockPoisoned,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Outcome taxonomy of the poll operations.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("{0}")]
    Validation(String),

    #[error("poll not found: {0}")]
    NotFound(PollId),

    #[error("invalid poll id: {0:?}")]
    InvalidIdentifier(String),

    #[error("option index {index} is out of range (poll has {len} options)")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("voter has already voted on this poll")]
    AlreadyVoted,

    #[error("tallies for poll {poll_id} diverge from ledger: stored {stored:?}, ledger {ledger:?}")]
    Inconsistency {
        poll_id: PollId,
        stored: Vec<u64>,
        ledger: Vec<u64>,
    },

    #[error(transparent)]
    Storage(StoreError),
}

impl From<StoreError> for PollError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => PollError::NotFound(id),
            StoreError::IndexOutOfRange { index, len } => PollError::IndexOutOfRange {
                index: i64::try_from(index).unwrap_or(i64::MAX),
                len,
            },
            StoreError::NegativeIndex(index) => {
                PollError::Validation(format!("option index must be non-negative, got {index}"))
            }
            other => PollError::Storage(other),
        }
    }
}

impl From<JsonRejection> for PollError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(%rejection, "unreadable request body");
        let message = match rejection {
            JsonRejection::JsonDataError(_) => "request body has missing or mistyped fields",
            JsonRejection::JsonSyntaxError(_) => "request body is not valid JSON",
            JsonRejection::MissingJsonContentType(_) => "expected a JSON request body",
            _ => "invalid request body",
        };
        PollError::Validation(message.to_string())
    }
}

impl PollError {
    /// True for outcomes caused by the caller's input rather than the system.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, PollError::Inconsistency { .. } | PollError::Storage(_))
    }
}

impl PollError {
    /// HTTP status for this outcome.
    ///
    /// - Validation, bad identifier, bad index: 400
    /// - Missing poll: 404
    /// - Already voted: 409
    /// - Inconsistency, storage: 500
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidIdentifier(_) | Self::IndexOutOfRange { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyVoted => StatusCode::CONFLICT,
            Self::Inconsistency { .. } | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PollError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_rejection() {
            debug!(error = %self, %status, "request rejected");
        } else {
            error!(error = %self, "request failed");
        }
        let message = match &self {
            Self::Inconsistency { .. } | Self::Storage(_) => "internal server error".to_string(),
            Self::AlreadyVoted => "You have already voted on this poll".to_string(),
            Self::NotFound(_) => "Poll not found".to_string(),
            Self::InvalidIdentifier(_) => "Invalid poll ID".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_poll_not_found() {
        let id = PollId::new();
        let err: PollError = StoreError::NotFound(id).into();
        assert!(matches!(err, PollError::NotFound(got) if got == id));
    }

    #[test]
    fn test_store_range_maps_to_index_out_of_range() {
        let err: PollError = StoreError::IndexOutOfRange { index: 4, len: 2 }.into();
        assert!(matches!(err, PollError::IndexOutOfRange { index: 4, len: 2 }));
    }

    #[test]
    fn test_negative_index_is_validation() {
        let err: PollError = StoreError::NegativeIndex(-1).into();
        assert!(matches!(err, PollError::Validation(_)));
        assert!(err.is_rejection());
    }

    #[test]
    fn test_backend_failures_are_not_rejections() {
        let err: PollError = StoreError::LockPoisoned.into();
        assert!(matches!(err, PollError::Storage(_)));
        assert!(!err.is_rejection());
        assert_eq!(err.to_string(), "in-memory store lock poisoned");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            PollError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PollError::InvalidIdentifier("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PollError::IndexOutOfRange { index: 9, len: 2 }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PollError::NotFound(PollId::new()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(PollError::AlreadyVoted.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            PollError::Storage(StoreError::LockPoisoned).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_body_rejections_become_validation() {
        let rejection = Json::<serde_json::Value>::from_bytes(b"{\"optionIndex\":").unwrap_err();
        let err = PollError::from(rejection);
        assert!(matches!(&err, PollError::Validation(msg) if msg == "request body is not valid JSON"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.is_rejection());

        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Body {
            option_index: i64,
        }
        let rejection = Json::<Body>::from_bytes(b"{\"option_index\":\"0\"}").unwrap_err();
        let err = PollError::from(rejection);
        assert!(matches!(&err, PollError::Validation(msg) if !msg.contains("i64")));
    }

    #[tokio::test]
    async fn test_storage_errors_do_not_leak_details() {
        let err = PollError::Storage(StoreError::Corrupt("row 42 of secret_table".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("secret_table"));
        assert!(text.contains("internal server error"));
    }

    #[test]
    fn test_already_voted_display() {
        assert_eq!(
            PollError::AlreadyVoted.to_string(),
            "voter has already voted on this poll"
        );
    }
}
