use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found")]
    NotFound,
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("already done: {0}")]
    AlreadyDone(String),
    #[error("conflict")]
    Conflict,
}
