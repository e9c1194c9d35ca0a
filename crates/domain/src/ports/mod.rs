use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub mod idempotency;
pub mod jobs;
pub mod profile;
pub mod realtime;
pub mod support;
pub mod threads;
pub mod tips;
