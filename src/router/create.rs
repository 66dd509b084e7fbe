use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::Result;
use crate::user::UserCreationRequest;

pub const METHOD_NOT_ALLOWED: &str = "Method Not Allowed";

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    pub uid: String,
}

/// Handler to create user.
///
/// The body is read as JSON whatever its `Content-Type`. A body that cannot
/// be read, too large for instance, is answered like a malformed one.
pub async fn handler(
    State(state): State<AppState>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<Response>> {
    let request = serde_json::from_slice::<UserCreationRequest>(&body?)?;
    let uid = state.registration.register(request).await?;

    Ok(Json(Response { success: true, uid }))
}

/// Every method but `POST`.
pub async fn method_not_allowed() -> (StatusCode, &'static str) {
    (StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED)
}
