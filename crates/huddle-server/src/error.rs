//! HTTP error and response bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use huddle_core::HubError;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    // 401 Unauthorized
    #[error("Authentication required")]
    Unauthorized,

    // 400 Bad Request
    #[error("{0}")]
    BadRequest(String),

    // 503 Service Unavailable
    #[error("Chat hub is not running")]
    Unavailable,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unavailable => "UNAVAILABLE",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "error": { "code": self.code(), "message": self.to_string() }
        });
        (self.status(), Json(body)).into_response()
    }
}

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::Closed => ApiError::Unavailable,
            HubError::InvalidRoom(reason) => {
                ApiError::BadRequest(format!("Invalid room_id: {reason}"))
            }
        }
    }
}

/// Successful response body.
#[derive(Debug, Serialize)]
pub struct ApiBody<T> {
    /// Always `true`.
    pub success: bool,
    /// Response payload.
    pub data: T,
}

/// Wrap `data` in a success body.
pub fn ok<T: Serialize>(data: T) -> Json<ApiBody<T>> {
    Json(ApiBody {
        success: true,
        data,
    })
}
