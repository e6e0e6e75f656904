use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ServiceError;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ApiError {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub enum ErrorCode {
    // Validation errors (VALID_xxx)
    ValidInvalidInput,
    ValidMissingRequiredField,
    ValidInvalidId,
    ValidRestrictedKeyword,
    ValidBatchLimitExceeded,

    // Resource errors (RESOURCE_xxx)
    ResourceNotFound,
    ResourceConflict,

    // System errors (SYSTEM_xxx)
    SystemDatabaseError,
    SystemGraphError,
    SystemVectorError,
    SystemInternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidInvalidInput => "VALID_INVALID_INPUT",
            ErrorCode::ValidMissingRequiredField => "VALID_MISSING_REQUIRED_FIELD",
            ErrorCode::ValidInvalidId => "VALID_INVALID_ID",
            ErrorCode::ValidRestrictedKeyword => "VALID_RESTRICTED_KEYWORD",
            ErrorCode::ValidBatchLimitExceeded => "VALID_BATCH_LIMIT_EXCEEDED",
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::ResourceConflict => "RESOURCE_CONFLICT",
            ErrorCode::SystemDatabaseError => "SYSTEM_DATABASE_ERROR",
            ErrorCode::SystemGraphError => "SYSTEM_GRAPH_ERROR",
            ErrorCode::SystemVectorError => "SYSTEM_VECTOR_ERROR",
            ErrorCode::SystemInternalError => "SYSTEM_INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            ErrorCode::ValidInvalidInput
            | ErrorCode::ValidMissingRequiredField
            | ErrorCode::ValidInvalidId
            | ErrorCode::ValidRestrictedKeyword
            | ErrorCode::ValidBatchLimitExceeded => StatusCode::BAD_REQUEST,

            // 404 Not Found
            ErrorCode::ResourceNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            ErrorCode::ResourceConflict => StatusCode::CONFLICT,

            // 500 Internal Server Error
            ErrorCode::SystemDatabaseError
            | ErrorCode::SystemGraphError
            | ErrorCode::SystemVectorError
            | ErrorCode::SystemInternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AppError {
    code: ErrorCode,
    message: String,
    details: Option<serde_json::Value>,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    // Convenience constructors for common errors
    pub fn not_found(resource: &str) -> Self {
        Self::new(ErrorCode::ResourceNotFound, format!("{} not found", resource))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceConflict, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidInvalidInput, message)
    }

    pub fn missing_field(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidMissingRequiredField, message)
    }

    pub fn restricted_keyword(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidRestrictedKeyword, message)
    }

    pub fn batch_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidBatchLimitExceeded, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SystemInternalError, message)
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ApiError {
            error: self.message,
            error_code: self.code.as_str().to_string(),
            details: self.details,
        });

        (self.code.status_code(), body).into_response()
    }
}

pub type ApiResult<T> = Result<(StatusCode, T), (StatusCode, AppError)>;

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match &err {
            ServiceError::NotFound(_) => AppError::new(ErrorCode::ResourceNotFound, err.to_string()),
            ServiceError::Conflict(_) => AppError::new(ErrorCode::ResourceConflict, err.to_string()),
            ServiceError::Validation(_) => {
                AppError::new(ErrorCode::ValidInvalidInput, err.to_string())
            }
            ServiceError::InvalidId(_) => AppError::new(ErrorCode::ValidInvalidId, err.to_string()),
            ServiceError::Database(_) => {
                AppError::new(ErrorCode::SystemDatabaseError, err.to_string())
            }
            ServiceError::Graph(_) => AppError::new(ErrorCode::SystemGraphError, err.to_string()),
            ServiceError::Vector(_) | ServiceError::Embedding(_) | ServiceError::Extraction(_) => {
                AppError::new(ErrorCode::SystemVectorError, err.to_string())
            }
            ServiceError::Internal(_) => {
                AppError::new(ErrorCode::SystemInternalError, err.to_string())
            }
        }
    }
}

impl From<ServiceError> for (StatusCode, AppError) {
    fn from(err: ServiceError) -> Self {
        let app_error = AppError::from(err);
        (app_error.status_code(), app_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_spec_status_codes() {
        let cases: Vec<(ServiceError, StatusCode)> = vec![
            (
                ServiceError::NotFound("Project 'x'".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                ServiceError::Conflict("slug taken".into()),
                StatusCode::CONFLICT,
            ),
            (
                ServiceError::Validation("bad input".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::InvalidId("abc".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::Graph("engine exploded".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServiceError::Vector("unreachable".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let (status, _) = <(StatusCode, AppError)>::from(err);
            assert_eq!(status, expected);
        }
    }
}
