//! Error types for squall-core

use crate::http::StatusCode;
use squall_router::PathError;
use thiserror::Error;

/// Result type alias for squall operations
pub type Result<T> = std::result::Result<T, Error>;

/// Socket read/write/close failures
#[derive(Debug, Error)]
pub enum SocketError {
    /// Non-fatal, the caller may retry later
    #[error("socket would block")]
    WouldBlock,

    #[error("broken pipe")]
    BrokenPipe,

    /// Peer closed the connection (EOF or zero-length write)
    #[error("connection closed")]
    Closed,

    #[error("socket timed out")]
    TimedOut,

    #[error("socket IO error: {0}")]
    Io(std::io::Error),
}

impl SocketError {
    /// Whether this failure ends the connection
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SocketError::WouldBlock)
    }
}

impl From<std::io::Error> for SocketError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::WouldBlock => SocketError::WouldBlock,
            ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
                SocketError::BrokenPipe
            }
            ErrorKind::UnexpectedEof | ErrorKind::WriteZero => SocketError::Closed,
            ErrorKind::TimedOut => SocketError::TimedOut,
            _ => SocketError::Io(err),
        }
    }
}

/// Malformed cookie, found while building routes
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CookieError {
    #[error("invalid cookie name: {0:?}")]
    InvalidName(String),

    #[error("invalid value for cookie {name:?}")]
    InvalidValue { name: String },

    #[error("invalid {attribute} attribute for cookie {name:?}")]
    InvalidAttribute { name: String, attribute: &'static str },
}

/// Malformed HTTP message, found while building routes
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("invalid header name: {0:?}")]
    InvalidHeaderName(String),

    #[error("invalid value for header {name:?}")]
    InvalidHeaderValue { name: String },

    /// 1xx, 204 and 304 responses carry no body
    #[error("status {status} does not allow a body")]
    BodyNotAllowed { status: u16 },

    #[error(transparent)]
    Cookie(#[from] CookieError),
}

/// Raised by a dynamic middleware handler
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("middleware error ({status}): {message}")]
pub struct MiddlewareError {
    /// Status the error responder should use
    pub status: StatusCode,
    pub message: String,
}

impl MiddlewareError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Failure while a responder is producing or writing its response
#[derive(Debug, Error)]
pub enum ResponderError {
    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error(transparent)]
    Middleware(#[from] MiddlewareError),

    #[error(transparent)]
    Message(#[from] MessageError),

    /// A chunk source failed mid-stream
    #[error("stream error: {0}")]
    Stream(String),

    /// A route handler failed
    #[error("handler error: {0}")]
    Handler(String),

    /// The request could not be read or parsed
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}

impl ResponderError {
    /// Status an error response for this failure should carry
    pub fn status(&self) -> StatusCode {
        match self {
            ResponderError::Middleware(err) => err.status,
            ResponderError::Rejected { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the connection itself failed, so nothing more can be written
    pub fn is_socket(&self) -> bool {
        matches!(self, ResponderError::Socket(_))
    }
}

/// Route-table construction or registration failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("duplicate route: {route}")]
    DuplicateRoute { route: String },

    #[error("invalid route {route}: {reason}")]
    InvalidRoute { route: String, reason: String },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Cookie(#[from] CookieError),
}

impl Error {
    /// Response status for an error raised while reading a request, `None`
    /// when the client is owed no response
    pub fn request_status(&self) -> Option<StatusCode> {
        match self {
            Error::Parse(_) | Error::InvalidMethod(_) => Some(StatusCode::BAD_REQUEST),
            Error::HeadTooLarge { .. } => Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE),
            Error::BodyTooLarge { .. } => Some(StatusCode::PAYLOAD_TOO_LARGE),
            _ => None,
        }
    }
}

/// Error types for the squall HTTP server
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid HTTP method
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Malformed request head
    #[error("Parse error: {0}")]
    Parse(String),

    /// Request head larger than the configured limit
    #[error("Request head too large: {size} bytes exceeds limit of {limit} bytes")]
    HeadTooLarge { size: usize, limit: usize },

    /// Declared body larger than the configured limit
    #[error("Request body too large: {size} bytes exceeds limit of {limit} bytes")]
    BodyTooLarge { size: usize, limit: usize },

    /// Invalid server configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error(transparent)]
    Responder(#[from] ResponderError),

    #[error(transparent)]
    Router(#[from] RouterError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
