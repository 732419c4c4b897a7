//! Transfer failure reported by a transport or raised by the engine's post-transfer stages.

use std::fmt;

/// Coarse failure category. Integer codes match what hosts of the update API expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferErrorCode {
    InvalidParams,
    FileOp,
    ImplInternal,
    Abort,
    /// Received bytes were rejected by the verify callback.
    Verification,
    /// Gzip inflate failed.
    Decompress,
}

impl TransferErrorCode {
    pub fn as_i32(self) -> i32 {
        match self {
            TransferErrorCode::InvalidParams => -1,
            TransferErrorCode::FileOp => -2,
            TransferErrorCode::ImplInternal => -3,
            TransferErrorCode::Abort => -4,
            TransferErrorCode::Verification => -5,
            TransferErrorCode::Decompress => -6,
        }
    }
}

impl fmt::Display for TransferErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferErrorCode::InvalidParams => "invalid parameters",
            TransferErrorCode::FileOp => "file operation failed",
            TransferErrorCode::ImplInternal => "transport error",
            TransferErrorCode::Abort => "aborted",
            TransferErrorCode::Verification => "verification failed",
            TransferErrorCode::Decompress => "decompression failed",
        };
        f.write_str(s)
    }
}

/// `code` is the coarse category; `detail` carries the underlying code
/// (HTTP status, curl code, OS errno) or 0 when there is none.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct TransferError {
    pub code: TransferErrorCode,
    pub detail: i64,
    pub message: String,
}

impl TransferError {
    pub fn new(code: TransferErrorCode, detail: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            detail,
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(TransferErrorCode::InvalidParams, 0, message)
    }

    pub fn file_op(err: &std::io::Error, message: impl Into<String>) -> Self {
        Self::new(
            TransferErrorCode::FileOp,
            err.raw_os_error().map(i64::from).unwrap_or(0),
            message,
        )
    }

    pub fn aborted() -> Self {
        Self::new(TransferErrorCode::Abort, 0, "transfer aborted")
    }

    pub fn verification(path: &str) -> Self {
        Self::new(
            TransferErrorCode::Verification,
            0,
            format!("verification rejected {}", path),
        )
    }

    pub fn decompress(message: impl Into<String>) -> Self {
        Self::new(TransferErrorCode::Decompress, 0, message)
    }
}
