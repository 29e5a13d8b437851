//! Remote model repository error types

use thiserror::Error;

/// Errors returned by a [`ModelRepository`](crate::repository::ModelRepository).
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The caller does not own or cannot access the project
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The project does not exist on the remote side
    #[error("Project {0} not found")]
    NotFound(String),

    /// Network or server-side failure that may succeed on a later attempt
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The scene graph could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl RepositoryError {
    /// Whether another attempt with the same payload could succeed.
    ///
    /// Authorization, missing projects and malformed payloads fail the same
    /// way every time, so they are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RepositoryError::Transient(_) | RepositoryError::Database(_)
        )
    }

    /// Check if this is an authorization failure
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RepositoryError::Unauthorized(_))
    }

    /// Stable short code used in log fields
    pub fn code(&self) -> &'static str {
        match self {
            RepositoryError::Unauthorized(_) => "unauthorized",
            RepositoryError::NotFound(_) => "not_found",
            RepositoryError::Transient(_) => "transient",
            RepositoryError::Serialization(_) => "serialization",
            RepositoryError::Database(_) => "database",
        }
    }
}
