//! Error types for the HTTP adapter.

use thiserror::Error;

/// Errors that can occur while parsing an HTTP request.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The method is not a valid HTTP token.
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// The request target is not an absolute path.
    #[error("Invalid HTTP path")]
    InvalidPath,

    /// The request line is malformed (wrong format or missing components).
    #[error("Malformed request line: {0}")]
    MalformedRequestLine(String),

    #[error("Invalid HTTP version: {0}")]
    InvalidVersion(String),

    /// A required header is missing from the request.
    #[error("Required header is missing: {0}")]
    MissingHeader(String),

    #[error("Invalid header format")]
    InvalidHeaderFormat,

    #[error("Invalid Content-Length: {0}")]
    InvalidContentLength(String),

    /// The request is empty.
    #[error("Empty request")]
    EmptyRequest,

    /// More bytes are needed to complete the request.
    #[error("Incomplete request")]
    Incomplete,
}

/// Errors that can occur during HTTP server operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Error parsing an HTTP request.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
