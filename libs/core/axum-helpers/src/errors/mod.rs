pub mod handlers;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use utoipa::ToSchema;
use validator::{ValidationErrors, ValidationErrorsKind};

pub const INVALID_REQUEST: &str = "invalid request";
pub const INTERNAL_ERROR: &str = "internal error";

/// Body of every error response.
///
/// ```json
/// { "error": "invalid request", "validations": { "description": "must not be empty" } }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    /// Field path to message, present only for field-level validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validations: Option<BTreeMap<String, String>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            validations: None,
        }
    }
}

/// Transport-level error: each variant maps to exactly one status code.
///
/// Internal details are logged, never rendered; a 500 body is always
/// `{"error":"internal error"}`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {message}")]
    BadRequest {
        message: String,
        validations: Option<ValidationErrors>,
    },

    #[error("JSON extraction error: {0}")]
    JsonRejection(#[from] JsonRejection),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest {
                message,
                validations,
            } => {
                tracing::info!(reason = %message, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse {
                        error: INVALID_REQUEST.to_string(),
                        validations: validations
                            .as_ref()
                            .map(flatten_validations)
                            .filter(|v| !v.is_empty()),
                    },
                )
            }
            AppError::JsonRejection(rejection) => {
                tracing::info!(reason = %rejection.body_text(), "Rejected request body");
                (StatusCode::BAD_REQUEST, ErrorResponse::new(INVALID_REQUEST))
            }
            AppError::NotFound(message) => {
                tracing::info!(reason = %message, "Not found");
                (StatusCode::NOT_FOUND, ErrorResponse::new(message))
            }
            AppError::Internal(message) => {
                tracing::error!(reason = %message, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new(INTERNAL_ERROR),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Flatten nested validator output into `{"dates.start": "..."}` style entries.
///
/// Struct-level (schema) failures are reported under the path of the struct
/// that raised them, or `request` at the top level.
pub fn flatten_validations(errors: &ValidationErrors) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    collect(errors, "", &mut out);
    out
}

fn collect(errors: &ValidationErrors, prefix: &str, out: &mut BTreeMap<String, String>) {
    for (field, kind) in errors.errors() {
        let path = match (prefix.is_empty(), field.as_ref()) {
            (true, "__all__") => "request".to_string(),
            (false, "__all__") => prefix.to_string(),
            (true, name) => name.to_string(),
            (false, name) => format!("{prefix}.{name}"),
        };

        match kind {
            ValidationErrorsKind::Field(list) => {
                if let Some(first) = list.first() {
                    let message = first
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed {} check", first.code));
                    out.entry(path).or_insert(message);
                }
            }
            ValidationErrorsKind::Struct(inner) => collect(inner, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect(inner, &format!("{path}[{index}]"), out);
                }
            }
        }
    }
}
