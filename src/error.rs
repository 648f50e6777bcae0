use thiserror::Error;

/// Crate-wide error taxonomy (spec §7). Every fallible operation surfaced to
/// the HTTP layer or the scheduler resolves to one of these variants so the
/// caller can decide how to react without inspecting error text.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("container runtime operation failed: {0}")]
    RuntimeOp(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Store-level error, kept distinct from [`ServiceError`] so callers inside
/// the store never need to know about HTTP status mapping. Converts into
/// [`ServiceError`] at the boundary with the service layer (spec §4.1).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("operation failed: {0}")]
    OperationFailed(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            other => StoreError::OperationFailed(other.to_string()),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServiceError::NotFound("entity not found".to_string()),
            StoreError::OperationFailed(msg) => ServiceError::Internal(msg),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::OperationFailed(format!("serialization failed: {err}"))
    }
}
