//! Error of a single transfer attempt, kept unconverted so it can be classified.

use std::fmt;

use crate::transport::{TransferError, TransferErrorCode};

#[derive(Debug)]
pub enum AttemptError {
    /// Curl reported an error (timeout, connection, etc.).
    Curl(curl::Error),
    /// Non-2xx response.
    Http(u32),
    /// Body ended before the advertised length.
    PartialTransfer { expected: u64, received: u64 },
    /// Local file write/rename failed. Not retried.
    Storage(std::io::Error),
    /// Abort token raised while the attempt ran.
    Aborted,
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Curl(e) => write!(f, "{}", e),
            AttemptError::Http(code) => write!(f, "HTTP {}", code),
            AttemptError::PartialTransfer { expected, received } => {
                write!(f, "partial transfer: expected {} bytes, got {}", expected, received)
            }
            AttemptError::Storage(e) => write!(f, "storage: {}", e),
            AttemptError::Aborted => write!(f, "transfer aborted"),
        }
    }
}

impl std::error::Error for AttemptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AttemptError::Curl(e) => Some(e),
            AttemptError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AttemptError {
    fn from(e: std::io::Error) -> Self {
        AttemptError::Storage(e)
    }
}

impl From<AttemptError> for TransferError {
    fn from(e: AttemptError) -> Self {
        let message = e.to_string();
        match e {
            AttemptError::Curl(ce) => {
                TransferError::new(TransferErrorCode::ImplInternal, i64::from(ce.code()), message)
            }
            AttemptError::Http(code) => {
                TransferError::new(TransferErrorCode::ImplInternal, i64::from(code), message)
            }
            AttemptError::PartialTransfer { .. } => {
                TransferError::new(TransferErrorCode::ImplInternal, 0, message)
            }
            AttemptError::Storage(io) => TransferError::file_op(&io, message),
            AttemptError::Aborted => TransferError::aborted(),
        }
    }
}
