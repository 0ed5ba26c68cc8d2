//! Error types for ngo-media
//!
//! [`MediaError`] is the domain taxonomy shared by the store, services and
//! wizard. [`ApiError`] maps it onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Page, SlotAddress};
use crate::wizard::WizardStep;

/// Blob store failures. No metadata write has happened when one of these
/// is returned.
#[derive(Debug, Error)]
pub enum UploadTransportError {
    #[error("upload cancelled")]
    Cancelled,

    #[error("upload timed out after {0}s")]
    TimedOut(u64),

    #[error("blob store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("blob store rejected the file: {0}")]
    Rejected(String),
}

/// Media slot domain errors
#[derive(Debug, Error)]
pub enum MediaError {
    /// Unknown page, category mismatch, non-positive slot, unacceptable file
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Slot {requested} exceeds the capacity of page '{page}' (max {max_slots})")]
    CapacityExceeded {
        page: Page,
        requested: i64,
        max_slots: u32,
    },

    /// A create lost the race for `slot`
    #[error("Slot {slot} is already occupied")]
    Conflict { slot: SlotAddress },

    /// Replace or delete target no longer exists
    #[error("Picture {id} not found")]
    NotFound { id: Uuid },

    #[error("Upload failed: {0}")]
    UploadTransport(#[from] UploadTransportError),

    /// Wizard input not valid in the current step
    #[error("'{action}' is not allowed during {step}")]
    InvalidTransition {
        step: WizardStep,
        action: &'static str,
    },

    #[error("Upload wizard {0} not found")]
    WizardNotFound(Uuid),

    /// Persistence failure
    #[error(transparent)]
    Store(#[from] ngo_common::Error),
}

impl From<sqlx::Error> for MediaError {
    fn from(err: sqlx::Error) -> Self {
        MediaError::Store(ngo_common::Error::Database(err))
    }
}

pub type MediaResult<T> = Result<T, MediaError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Media(#[from] MediaError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
            ApiError::Media(err) => {
                let (status, code) = match err {
                    MediaError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                    MediaError::CapacityExceeded { .. } => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "CAPACITY_EXCEEDED")
                    }
                    MediaError::Conflict { .. } => (StatusCode::CONFLICT, "SLOT_CONFLICT"),
                    MediaError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    MediaError::WizardNotFound(_) => (StatusCode::NOT_FOUND, "WIZARD_NOT_FOUND"),
                    MediaError::UploadTransport(_) => (StatusCode::BAD_GATEWAY, "UPLOAD_FAILED"),
                    MediaError::InvalidTransition { .. } => {
                        (StatusCode::CONFLICT, "INVALID_TRANSITION")
                    }
                    MediaError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
                };
                (status, code, err.to_string())
            }
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, "{}", message);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
