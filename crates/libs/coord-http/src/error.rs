//! Error handling for the HTTP status surface.
//!
//! Mirrors the fail-secure shape the teacher's full API server used:
//! structured error codes, sanitized messages (no raw filesystem paths or
//! internal error strings reach the client), proper status mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadRequest,
    NotFound,
    ValidationError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_str(),
            error: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Store error")]
    Store(#[from] coord_core::Error),

    #[error("Credit ledger error")]
    Credit(#[from] coord_credit::Error),

    #[error("Resource not found: {0}")]
    NotFound(String),
}

/// Never expose internal filesystem paths or corruption detail to the
/// client; those land in the server-side trace emitted just below.
fn sanitize_core_error(error: &coord_core::Error) -> (StatusCode, ErrorCode, String) {
    match error {
        coord_core::Error::TeamNotFound(name) => (
            StatusCode::NOT_FOUND,
            ErrorCode::NotFound,
            format!("Team \"{name}\" not found"),
        ),
        coord_core::Error::TaskNotFound { team, id } => (
            StatusCode::NOT_FOUND,
            ErrorCode::NotFound,
            format!("Task \"{id}\" not found in team \"{team}\""),
        ),
        coord_core::Error::Validation(ve) => {
            (StatusCode::BAD_REQUEST, ErrorCode::ValidationError, ve.to_string())
        }
        coord_core::Error::PathTraversal(_) => (
            StatusCode::BAD_REQUEST,
            ErrorCode::BadRequest,
            "Invalid identifier".to_string(),
        ),
        coord_core::Error::InvalidTransition { from, to } => (
            StatusCode::CONFLICT,
            ErrorCode::ValidationError,
            format!("Cannot transition from \"{from}\" to \"{to}\""),
        ),
        coord_core::Error::LockTimeout { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError,
            "Lock acquisition timed out".to_string(),
        ),
        coord_core::Error::Corrupted(_) | coord_core::Error::Io(_) | coord_core::Error::SerdeJson(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError,
            "Store operation failed".to_string(),
        ),
    }
}

fn sanitize_credit_error(error: &coord_credit::Error) -> (StatusCode, ErrorCode, String) {
    match error {
        coord_credit::Error::GrantNotFound(_) => (
            StatusCode::NOT_FOUND,
            ErrorCode::NotFound,
            "Grant not found".to_string(),
        ),
        coord_credit::Error::RevocationRefused(_) => (
            StatusCode::CONFLICT,
            ErrorCode::ValidationError,
            "Grant cannot be revoked: balance already negative".to_string(),
        ),
        coord_credit::Error::Core(inner) => sanitize_core_error(inner),
        coord_credit::Error::SerdeJson(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError,
            "Ledger operation failed".to_string(),
        ),
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        tracing::error!(error = ?self, "request error");

        let (status, code, message) = match &self {
            ServerError::Store(e) => sanitize_core_error(e),
            ServerError::Credit(e) => sanitize_credit_error(e),
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorCode::NotFound, msg.clone()),
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
