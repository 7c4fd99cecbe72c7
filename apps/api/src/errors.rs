use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::session::SessionError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Limit reached: {0}")]
    RateLimited(String),

    #[error("Interview service error: {0}")]
    Service(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::NotEntitled => AppError::Forbidden(message),
            SessionError::MissingSetup | SessionError::MissingTranscript => {
                AppError::NotFound(message)
            }
            SessionError::EmptyAnswer => AppError::Validation(message),
            SessionError::EvaluationInFlight
            | SessionError::QuestionInFlight
            | SessionError::InvalidTransition { .. }
            | SessionError::Ended => AppError::Conflict(message),
            SessionError::Limited => AppError::RateLimited(message),
            SessionError::Service(e) if e.is_rate_limited() => AppError::RateLimited(e.to_string()),
            SessionError::Service(e) => AppError::Service(e.to_string()),
            SessionError::Store(e) => AppError::Internal(anyhow::Error::new(e)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::RateLimited(msg) => {
                tracing::warn!("Practice limit reached: {msg}");
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "LIMIT_REACHED",
                    "Practice limit reached. Upgrade to continue.".to_string(),
                )
            }
            AppError::Service(msg) => {
                tracing::error!("Interview service error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "SERVICE_ERROR",
                    "The interview service is unavailable. Please try again.".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
