use axum::response::{IntoResponse, Response};
use axum_helpers::AppError;
use std::error::Error as StdError;
use strum::Display;
use thiserror::Error;
use validator::ValidationErrors;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Error taxonomy shared by every layer of the tasks domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCode {
    Unknown,
    NotFound,
    InvalidArgument,
}

/// Coded error with an optional cause.
///
/// Wrapping keeps the inner error reachable through [`StdError::source`];
/// the code of the outermost error decides how the error is rendered.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TaskError {
    code: ErrorCode,
    message: String,
    #[source]
    source: Option<BoxError>,
    validations: Option<ValidationErrors>,
}

pub type TaskResult<T> = Result<T, TaskError>;

impl TaskError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            validations: None,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unknown, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    /// Field-level validation failure.
    pub fn validation(errors: ValidationErrors) -> Self {
        Self {
            validations: Some(errors),
            ..Self::invalid_argument("validation failed")
        }
    }

    /// Wrap `source` under a new code and message.
    pub fn wrap(source: impl Into<BoxError>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::new(code, message)
        }
    }

    pub fn cancelled() -> Self {
        Self::unknown("operation cancelled")
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// First set of field-level validation details found along the cause chain.
    pub fn validations(&self) -> Option<&ValidationErrors> {
        let mut current: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(err) = current {
            if let Some(validations) = err
                .downcast_ref::<TaskError>()
                .and_then(|task_err| task_err.validations.as_ref())
            {
                return Some(validations);
            }
            current = err.source();
        }
        None
    }

    /// Message followed by every cause, joined with `: `.
    pub fn chain(&self) -> String {
        let mut out = self.message.clone();
        let mut current = self.source();
        while let Some(err) = current {
            out.push_str(": ");
            out.push_str(&err.to_string());
            current = err.source();
        }
        out
    }
}

impl From<TaskError> for AppError {
    fn from(err: TaskError) -> Self {
        match err.code {
            ErrorCode::InvalidArgument => AppError::BadRequest {
                message: err.chain(),
                validations: err.validations().cloned(),
            },
            ErrorCode::NotFound => AppError::NotFound(err.message),
            ErrorCode::Unknown => AppError::Internal(err.chain()),
        }
    }
}

impl IntoResponse for TaskError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}
