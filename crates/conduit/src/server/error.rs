use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::auth::AuthError;

/// Failures surfaced before a streaming response has started
#[derive(Error, Debug)]
pub enum ApiError {
    /// No token could be obtained for the upstream call
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The request body could not be turned into an upstream payload
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Failed to build the response itself
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(_) => StatusCode::BAD_GATEWAY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error category for logging and the JSON body
    pub fn category(&self) -> &'static str {
        match self {
            ApiError::Auth(_) => "auth_error",
            ApiError::BadRequest(_) => "invalid_request",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(category = self.category(), "Request failed: {self}");

        let body = serde_json::json!({
            "error": {
                "type": self.category(),
                "message": self.to_string(),
            }
        });

        (self.status(), Json(body)).into_response()
    }
}
