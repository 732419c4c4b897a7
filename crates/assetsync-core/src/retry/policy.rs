use std::time::Duration;

/// High-level classification of an error for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation timed out (connect/read).
    Timeout,
    /// Server asked us to slow down (429, 503).
    Throttled,
    /// Network-level failure (connection reset, DNS, short body).
    Connection,
    /// Retryable server error (5xx other than 503).
    Http5xx(u16),
    /// Anything else; never retried.
    Other,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Exponential backoff with an attempt cap and a delay cap.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// `attempt` is 1-based (1 = first attempt).
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }

        match kind {
            ErrorKind::Other => RetryDecision::NoRetry,
            ErrorKind::Timeout
            | ErrorKind::Connection
            | ErrorKind::Throttled
            | ErrorKind::Http5xx(_) => {
                // base * 2^(attempt-1), capped.
                let exp = 1u32 << attempt.saturating_sub(1).min(8);
                let delay = self.base_delay.saturating_mul(exp).min(self.max_delay);
                RetryDecision::RetryAfter(delay)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delay(d: RetryDecision) -> Duration {
        match d {
            RetryDecision::RetryAfter(d) => d,
            RetryDecision::NoRetry => panic!("expected retry"),
        }
    }

    #[test]
    fn no_retry_for_other() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(1, ErrorKind::Other), RetryDecision::NoRetry);
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let p = RetryPolicy {
            max_attempts: 20,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(delay(p.decide(1, ErrorKind::Timeout)), Duration::from_millis(100));
        assert_eq!(delay(p.decide(2, ErrorKind::Timeout)), Duration::from_millis(200));
        assert_eq!(delay(p.decide(3, ErrorKind::Connection)), Duration::from_millis(400));
        assert_eq!(delay(p.decide(12, ErrorKind::Throttled)), Duration::from_secs(1));
    }

    #[test]
    fn respects_max_attempts() {
        let p = RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        };
        assert!(matches!(
            p.decide(1, ErrorKind::Http5xx(502)),
            RetryDecision::RetryAfter(_)
        ));
        assert_eq!(p.decide(2, ErrorKind::Http5xx(502)), RetryDecision::NoRetry);
        assert_eq!(RetryPolicy::none().decide(1, ErrorKind::Timeout), RetryDecision::NoRetry);
    }
}
