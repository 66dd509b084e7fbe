//! Error handler for create-user.

use axum::Json;
use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::IdentityError;
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing every reason a registration can fail.
///
/// All of them are reported to the caller the same way, with a `400` status.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Payload(#[from] BytesRejection),

    #[error("{0}")]
    Body(#[from] serde_json::Error),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Body sent back on failure.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub success: bool,
    pub error: String,
}

impl From<&ServerError> for ResponseError {
    fn from(err: &ServerError) -> Self {
        Self {
            success: false,
            error: err.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let kind = match &self {
            ServerError::Payload(_) => "payload",
            ServerError::Body(_) => "body",
            ServerError::Identity(_) => "identity",
            ServerError::Store(_) => "store",
        };
        tracing::warn!(error = %self, kind, "user creation failed");

        (StatusCode::BAD_REQUEST, Json(ResponseError::from(&self)))
            .into_response()
    }
}

/// Error payload shared by Google REST APIs.
#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Extract a readable message from a failed Google API response.
pub(crate) async fn google_error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match serde_json::from_str::<GoogleErrorBody>(&body) {
        Ok(GoogleErrorBody { error }) if !error.message.is_empty() => {
            error.message
        },
        Ok(GoogleErrorBody { error }) => {
            error.status.unwrap_or_else(|| status.to_string())
        },
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => format!("{status}: {}", body.trim()),
    }
}
