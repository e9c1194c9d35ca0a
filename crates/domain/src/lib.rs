pub mod auth;
pub mod error;
pub mod idempotency;
pub mod identity;
pub mod jobs;
pub mod ports;
pub mod realtime;
pub mod support;
pub mod threads;
pub mod timeline;
pub mod tips;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
