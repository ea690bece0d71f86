use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use outbeat_common::error::OutbeatError;

pub struct ApiError(pub OutbeatError);

impl From<OutbeatError> for ApiError {
    fn from(err: OutbeatError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            OutbeatError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            OutbeatError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };

        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}
