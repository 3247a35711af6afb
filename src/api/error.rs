//! API error taxonomy and its HTTP mapping.

use crate::customer::{storage::StoreError, types::ValidationError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Every way a request to `/api` can fail
///
/// Rendered as `{"error": <message>}` with the status from [`ApiError::status_code`].
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or wrong `x-session-token`
    #[error("request cannot be authenticated!")]
    AuthenticationFailure,
    /// `user-agent` mentions "bot" in any casing
    #[error("bad bot, go away!")]
    BotRejected,
    /// Body or query does not have the expected shape
    #[error("{0}")]
    MalformedRequest(String),
    /// Name contains a non-alphabetic character
    #[error("name has special characters")]
    InvalidName,
    /// Insert failed; the store's cause is passed through to the caller
    #[error("{0}")]
    PersistenceError(#[from] StoreError),
    /// No record with the requested id
    #[error("error while fetching customer")]
    NotFound,
    /// The registration task itself failed (panicked or was cancelled)
    #[error("internal error: {0}")]
    Internal(String),
    /// Lookup hit a store error; reported like a miss
    #[error("error while fetching customer")]
    LookupFailed(#[source] StoreError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationFailure => StatusCode::FORBIDDEN,
            Self::BotRejected
            | Self::MalformedRequest(_)
            | Self::InvalidName
            | Self::NotFound
            | Self::LookupFailed(_) => StatusCode::BAD_REQUEST,
            Self::PersistenceError(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidName => Self::InvalidName,
            other => Self::MalformedRequest(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
