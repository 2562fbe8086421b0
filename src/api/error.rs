use axum::Json;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Request-plane failure. The browser client treats any `{error}` body as a
/// failed call, so everything renders as 200 with the message inline rather
/// than as an HTTP status.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match self {
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) | ApiError::Internal(msg) => msg,
        };
        Json(json!({ "error": message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{err:#}"))
    }
}
