pub mod config;
pub mod idempotency;
pub mod jobs;
pub mod logging;
pub mod repositories;
