//! Map HTTP status and curl errors onto retry kinds.

use super::attempt::AttemptError;
use super::policy::ErrorKind;

pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Other,
    }
}

pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

pub fn classify(e: &AttemptError) -> ErrorKind {
    match e {
        AttemptError::Curl(ce) => classify_curl_error(ce),
        AttemptError::Http(code) => classify_http_status(*code),
        AttemptError::PartialTransfer { .. } => ErrorKind::Connection,
        AttemptError::Storage(_) | AttemptError::Aborted => ErrorKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_429_and_503_throttled() {
        assert_eq!(classify_http_status(429), ErrorKind::Throttled);
        assert_eq!(classify_http_status(503), ErrorKind::Throttled);
    }

    #[test]
    fn http_5xx_retryable_4xx_not() {
        assert_eq!(classify_http_status(502), ErrorKind::Http5xx(502));
        assert_eq!(classify_http_status(404), ErrorKind::Other);
    }

    #[test]
    fn short_body_is_connection_storage_is_not_retried() {
        let partial = AttemptError::PartialTransfer {
            expected: 10,
            received: 4,
        };
        assert_eq!(classify(&partial), ErrorKind::Connection);
        let storage = AttemptError::Storage(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert_eq!(classify(&storage), ErrorKind::Other);
        assert_eq!(classify(&AttemptError::Aborted), ErrorKind::Other);
    }
}
