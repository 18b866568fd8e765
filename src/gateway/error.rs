use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::error::BookingError;

/// Body of every failed response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
}

impl ErrorBody {
    fn fail(message: impl Into<String>) -> Self {
        Self {
            status: "fail".to_string(),
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Booking(BookingError),
    /// Malformed request: bad headers, path, query or body.
    BadRequest(String),
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        ApiError::Booking(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Booking(err) if err.is_client_error() => {
                tracing::warn!(error = %err, "request rejected");
                (StatusCode::BAD_REQUEST, ErrorBody::fail(err.to_string()))
            }
            ApiError::Booking(err) => {
                tracing::error!(error = %err, error_debug = ?err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::error("internal error"),
                )
            }
            ApiError::BadRequest(message) => {
                tracing::warn!(%message, "bad request");
                (StatusCode::BAD_REQUEST, ErrorBody::fail(message))
            }
        };
        (status, Json(body)).into_response()
    }
}
