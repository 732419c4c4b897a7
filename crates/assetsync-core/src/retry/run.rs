//! Retry loop: run an attempt until success, a non-retryable error, or abort.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::attempt::AttemptError;
use super::classify;
use super::policy::{RetryDecision, RetryPolicy};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Sleeps in short slices so a raised abort token cuts the backoff short.
fn backoff(delay: Duration, abort: &AtomicBool) -> bool {
    let mut left = delay;
    while !left.is_zero() {
        if abort.load(Ordering::Relaxed) {
            return false;
        }
        let step = left.min(SLEEP_SLICE);
        std::thread::sleep(step);
        left -= step;
    }
    !abort.load(Ordering::Relaxed)
}

pub fn run_with_retry<F>(policy: &RetryPolicy, abort: &AtomicBool, mut f: F) -> Result<(), AttemptError>
where
    F: FnMut(u32) -> Result<(), AttemptError>,
{
    let mut attempt = 1u32;
    loop {
        if abort.load(Ordering::Relaxed) {
            return Err(AttemptError::Aborted);
        }
        match f(attempt) {
            Ok(()) => return Ok(()),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(d) => {
                        tracing::debug!(attempt, delay_ms = d.as_millis() as u64, error = %e, "retrying transfer");
                        if !backoff(d, abort) {
                            return Err(AttemptError::Aborted);
                        }
                        attempt += 1;
                    }
                }
            }
        }
    }
}
