//! Authenticated backend access.
//!
//! [`AuthenticatedHttpClient`] attaches the stored bearer token to every call
//! and performs a single coordinated refresh-and-replay on `401`.
//! [`with_backoff`] is an opt-in wrapper that retries calls which never got a
//! response.

mod client;
mod refresh;
mod retry;

pub use client::{ApiRequest, AuthenticatedHttpClient};
pub use retry::{RetryPolicy, Retryable, with_backoff};
