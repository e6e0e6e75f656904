// Service-level error type shared by every store gateway and service.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("Invalid entity ID: {0}")]
    InvalidId(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Graph query failed: {0}")]
    Graph(String),

    #[error("Vector store error: {0}")]
    Vector(String),

    #[error("Embedding request failed: {0}")]
    Embedding(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("{0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
