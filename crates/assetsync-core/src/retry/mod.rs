//! Retry and backoff for single transfers.
//!
//! Transports classify each failed attempt (timeout, throttling, connection
//! loss, 5xx) and ask the policy whether and when to try again before they
//! report a failure to the scheduler.

mod attempt;
mod classify;
mod policy;
mod run;

pub use attempt::AttemptError;
pub use classify::{classify, classify_curl_error, classify_http_status};
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
