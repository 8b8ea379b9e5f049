//! HTTP error mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use labelpress_core::PrintError;

/// Error a handler returns to the client
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<PrintError> for ApiError {
    fn from(e: PrintError) -> Self {
        let status = match &e {
            PrintError::Validation(_) => StatusCode::BAD_REQUEST,
            PrintError::QueueFull => StatusCode::TOO_MANY_REQUESTS,
            PrintError::UnavailablePrinter(_) | PrintError::BreakerOpen(_) => {
                StatusCode::BAD_REQUEST
            }
            PrintError::ProcessingTimeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
