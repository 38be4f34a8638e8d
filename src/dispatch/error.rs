//! Error types for the dispatch core.

use std::fmt;

use thiserror::Error;

/// Errors a dispatch call can end with.
///
/// The built-in kinds (`NotFound`, `BadRequest`, `Internal`) are produced by
/// the core itself. Application code signals its own failures either with a
/// coded [`ApiError`] or with a free-form message.
#[derive(Debug, Error)]
pub enum Error {
    /// No endpoint matched the method and path.
    #[error("Path not found")]
    NotFound,

    /// The request was malformed.
    #[error("Bad request")]
    BadRequest,

    /// A configuration fault, an invocation fault or a recovered panic.
    #[error("Internal error")]
    Internal,

    /// An error carrying an explicit status code.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The request body could not be decoded into the handler's input type.
    #[error("malformed request body: {0}")]
    Decode(#[from] serde_json::Error),

    /// A free-form error raised by a handler or a middleware hook.
    #[error("{0}")]
    Message(String),

    /// Any other error raised by application code.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// The class of an [`Error`], as seen by a transport adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Internal,
    /// A coded error with its status.
    Coded(u16),
    /// An application error without a status of its own.
    Application,
}

impl Error {
    /// Create a free-form error from anything printable.
    pub fn msg(message: impl fmt::Display) -> Self {
        Error::Message(message.to_string())
    }

    /// Wrap an arbitrary application error.
    pub fn other(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Other(Box::new(err))
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound => ErrorKind::NotFound,
            Error::BadRequest | Error::Decode(_) => ErrorKind::BadRequest,
            Error::Internal => ErrorKind::Internal,
            Error::Api(api_err) => ErrorKind::Coded(api_err.status_code),
            Error::Message(_) | Error::Other(_) => ErrorKind::Application,
        }
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Message(message)
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::Message(message.to_string())
    }
}

/// An error with status code information as well as error text.
///
/// Constructed by application code to signal domain-specific failures; the
/// transport adapters answer with `status_code` instead of a generic 500.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub status_code: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }
}

/// Errors raised while parsing a route pattern at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// The pattern has no method token before the first `/`.
    #[error("Route pattern has no method: {0}")]
    MissingMethod(String),

    /// The pattern has no `/` separating method and path.
    #[error("Route pattern has no path: {0}")]
    MissingPath(String),

    /// A `{}` segment with no variable name.
    #[error("Empty variable name in route pattern: {0}")]
    EmptyVariable(String),

    /// The same variable name appears twice in one pattern.
    #[error("Variable {name} bound twice in route pattern: {pattern}")]
    DuplicateVariable { name: String, pattern: String },
}
