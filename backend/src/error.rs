// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::{models::attempt::AttemptView, qcm::sampler::InsufficientQuestions, store::StoreError};

/// One rejected field of a payload. Validation reports all of them at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Flattens `validator` errors into field errors, sorted by field name.
pub fn field_errors(errors: &validator::ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = field.to_string();
            errs.iter().map(move |e| {
                FieldError::new(
                    field.clone(),
                    e.code.to_string(),
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string()),
                )
            })
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field).then(a.code.cmp(&b.code)));
    out
}

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // 500 Internal Server Error
    #[error("internal server error: {0}")]
    InternalServerError(String),

    // 400 Bad Request
    #[error("bad request: {0}")]
    BadRequest(String),

    // 401 Unauthorized
    #[error("unauthorized: {0}")]
    AuthError(String),

    // 403 Forbidden
    #[error("forbidden: {0}")]
    Forbidden(String),

    // 404 Not Found
    #[error("not found: {0}")]
    NotFound(String),

    // 409 Conflict (e.g., answering a closed attempt)
    #[error("conflict: {0}")]
    Conflict(String),

    // 422 Unprocessable Entity, every field error at once
    #[error("validation failed ({} errors)", .0.len())]
    Validation(Vec<FieldError>),

    // 422, the bank cannot satisfy the draw rule
    #[error(transparent)]
    InsufficientQuestions(#[from] InsufficientQuestions),

    // 409, carries the attempt that won the slot
    #[error("attempt already started")]
    AlreadyStarted(Box<AttemptView>),

    // 423 Locked, the session cannot be started now
    #[error("session {0} is locked")]
    SessionLocked(Uuid),
}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::Validation(details) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": "Validation failed", "details": details }),
            ),
            AppError::InsufficientQuestions(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": e.to_string(),
                    "difficulty": e.difficulty,
                    "requested": e.requested,
                    "available": e.available,
                }),
            ),
            AppError::AlreadyStarted(attempt) => (
                StatusCode::CONFLICT,
                json!({ "error": "Attempt already started", "attempt": attempt }),
            ),
            AppError::SessionLocked(id) => (
                StatusCode::LOCKED,
                json!({ "error": "Session is locked", "session_id": id, "status": "locked" }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Storage failures are never shown to clients; uniqueness clashes are.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(what) => AppError::Conflict(format!("{} is already taken", what)),
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(field_errors(&errors))
    }
}
