use std::io;

use thiserror::Error;

/// Errors raised by the relay core.
///
/// Categorized per the error-handling design: admission errors are counted
/// and the socket is closed without surfacing anything to the client beyond
/// the close itself; I/O errors trigger half-close propagation; protocol
/// errors stop a single `Direction`; fatal errors are process-level.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("admission refused: {0}")]
    Admission(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS protocol error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("fatal error: {0}")]
    Fatal(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
