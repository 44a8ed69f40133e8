use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::storage::StorageError;
use sea_orm::DbErr;
use serde::Serialize;

use crate::crud::{CrudError, ValidationErrors};
use crate::services::settings::SettingsError;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`, `TOKEN_MISSING`,
    /// `TOKEN_INVALID`, `INVALID_CREDENTIALS`, `PERMISSION_DENIED`, `NOT_FOUND`,
    /// `CONFLICT`, `INTERNAL_ERROR`.
    #[schema(example = "VALIDATION_ERROR")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "The given data was invalid.")]
    pub message: String,
    /// Field-keyed messages for form submissions.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = json!({ "title.en": ["The title (en) field is required."] }))]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    /// Malformed request (400).
    Validation(String),
    /// Field-level form errors (422).
    InvalidFields(ValidationErrors),
    TokenMissing,
    TokenInvalid,
    InvalidCredentials,
    PermissionDenied,
    NotFound(String),
    Conflict(String),
    /// Logged in full, answered with `message` only.
    Internal(String),
    InternalWithMessage { detail: String, message: String },
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        let body = |code: &'static str, message: String| ErrorBody {
            code,
            message,
            errors: None,
        };
        match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, body("VALIDATION_ERROR", msg)),
            AppError::InvalidFields(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: "The given data was invalid.".into(),
                    errors: Some(
                        errors
                            .fields()
                            .map(|f| (f.to_string(), errors.get(f).unwrap_or_default().to_vec()))
                            .collect(),
                    ),
                },
            ),
            AppError::TokenMissing => (
                StatusCode::UNAUTHORIZED,
                body("TOKEN_MISSING", "Authentication required".into()),
            ),
            AppError::TokenInvalid => (
                StatusCode::UNAUTHORIZED,
                body("TOKEN_INVALID", "Invalid or expired token".into()),
            ),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                body("INVALID_CREDENTIALS", "Invalid email or password".into()),
            ),
            AppError::PermissionDenied => (
                StatusCode::FORBIDDEN,
                body("PERMISSION_DENIED", "Insufficient permissions".into()),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, body("NOT_FOUND", msg)),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, body("CONFLICT", msg)),
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    body("INTERNAL_ERROR", "An unexpected error occurred".into()),
                )
            }
            AppError::InternalWithMessage { detail, message } => {
                tracing::error!("Internal error: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, body("INTERNAL_ERROR", message))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => AppError::NotFound("File not found".into()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<CrudError> for AppError {
    fn from(err: CrudError) -> Self {
        let notice = err.notice().message;
        match err {
            CrudError::ConfigurationNotFound(alias) => {
                tracing::debug!(alias = %alias, "unknown CRUD alias");
                AppError::NotFound("Not found".into())
            }
            CrudError::Authorization => AppError::PermissionDenied,
            CrudError::Validation(errors) => AppError::InvalidFields(errors),
            CrudError::NotFound { entity, .. } => AppError::NotFound(format!("{entity} not found")),
            CrudError::NoPendingDeletion => {
                AppError::Conflict("Nothing is staged for deletion".into())
            }
            CrudError::Malformed(msg) => AppError::Validation(msg),
            other => AppError::InternalWithMessage {
                detail: other.to_string(),
                message: notice,
            },
        }
    }
}

impl From<SettingsError> for AppError {
    fn from(err: SettingsError) -> Self {
        match err {
            SettingsError::NotFound(key) => {
                AppError::NotFound(format!("Setting '{key}' not found"))
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}
