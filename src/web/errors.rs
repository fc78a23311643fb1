//! # Web API Error Types
//!
//! Maps [`IndexerError`] onto HTTP status codes with a JSON
//! `{"error": ..., "message": ...}` body.

use crate::error::IndexerError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn parts(&self) -> (&'static str, &str) {
        match self {
            Self::BadRequest { message } => ("BAD_REQUEST", message),
            Self::NotFound { message } => ("NOT_FOUND", message),
            Self::Internal { message } => ("INTERNAL_ERROR", message),
        }
    }
}

impl From<IndexerError> for ApiError {
    fn from(err: IndexerError) -> Self {
        match err {
            IndexerError::Configuration(message) => Self::BadRequest { message },
            IndexerError::NotFound(message) => Self::NotFound { message },
            other => {
                error!(error = %other, "Request failed");
                Self::Internal {
                    message: other.to_string(),
                }
            }
        }
    }
}

impl From<uuid::Error> for ApiError {
    fn from(err: uuid::Error) -> Self {
        Self::bad_request(format!("invalid run id: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message) = self.parts();
        let body = json!({
            "error": code,
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
