use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use murmur_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Re-authentication for a sensitive change failed.
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// A stored document exists but cannot be decrypted or parsed.
    #[error("Stored data is unreadable")]
    Corrupt,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ServerError::NotFound("Not found".into()),
            StoreError::AlreadyExists => ServerError::BadRequest("Username already exists".into()),
            StoreError::InvalidCredentials => ServerError::InvalidCredentials,
            StoreError::InvalidId(id) => ServerError::BadRequest(format!("Invalid identifier: {id:?}")),
            StoreError::InvalidInput(message) => ServerError::BadRequest(message),
            StoreError::CorruptDocument {
                collection,
                id,
                reason,
            } => {
                error!(collection = %collection, id = %id, reason = %reason, "Corrupt document");
                ServerError::Corrupt
            }
            other => {
                error!(error = %other, "Store failure");
                ServerError::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::NotLoggedIn
            | ServerError::InvalidCredentials
            | ServerError::Unauthorized(_) => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::Corrupt => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            ServerError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "success": false,
            "message": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
