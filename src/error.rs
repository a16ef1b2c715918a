use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::protocol::backtrace::{self, Backtrace};

pub type Result<T> = core::result::Result<T, Error>;

/// All variants are `Clone` so a cursor can sticky-store its terminal error
/// and re-raise it on every subsequent call.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Transport lifecycle failure: DNS, connect, handshake rejection, EOF,
    /// or a submission against a poisoned connection.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("IO error: {0}")]
    IoError(Arc<std::io::Error>),

    /// The reader could not decode a response payload. Scoped to the token
    /// the payload was addressed to.
    #[error("Read error: {0}")]
    ReadError(Arc<serde_json::Error>),

    /// Server-reported failure for a single token.
    #[error(transparent)]
    DbError(#[from] DbError),

    #[error("Bad config error: {0}")]
    BadConfigError(String),

    /// A frame or payload violated the wire format.
    #[error("Invalid frame")]
    InvalidFrame,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ReadError(Arc::new(err))
    }
}

impl From<core::convert::Infallible> for Error {
    fn from(err: core::convert::Infallible) -> Self {
        match err {}
    }
}

/// Error category reported by the server for one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// CLIENT_ERROR: the server could not understand what the driver sent.
    BrokenClient,
    /// COMPILE_ERROR: the query is malformed.
    BadQuery,
    /// RUNTIME_ERROR: the query failed while running.
    Runtime,
    /// The response shape itself was not understood by the driver.
    UnexpectedResponse,
}

impl core::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::BrokenClient => "client error",
            Self::BadQuery => "compile error",
            Self::Runtime => "runtime error",
            Self::UnexpectedResponse => "unexpected response",
        };
        f.write_str(name)
    }
}

/// A server-reported error, scoped to one token.
///
/// When the originating term is present, the rendered form annotates the
/// subterm the backtrace points at with a `HERE(...)` marker.
#[derive(Debug, Clone, PartialEq)]
pub struct DbError {
    pub code: ErrorCode,
    pub message: String,
    pub term: Option<Value>,
    pub backtrace: Backtrace,
}

impl core::fmt::Display for DbError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(term) = &self.term {
            write!(f, "\n  in: {}", backtrace::annotate(term, self.backtrace.frames()))?;
        }
        Ok(())
    }
}

impl core::error::Error for DbError {}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::backtrace::Frame;

    #[test]
    fn db_error_renders_code_and_message() {
        let err = DbError {
            code: ErrorCode::BadQuery,
            message: "table name is not a string".to_string(),
            term: None,
            backtrace: Backtrace::default(),
        };
        assert_eq!(err.to_string(), "compile error: table name is not a string");
    }

    #[test]
    fn db_error_annotates_the_originating_term() {
        let err = DbError {
            code: ErrorCode::Runtime,
            message: "divide by zero".to_string(),
            term: Some(json!([24, [1, 0], {}])),
            backtrace: Backtrace::from(vec![Frame::Pos(1)]),
        };
        let rendered = err.to_string();
        assert!(rendered.starts_with("runtime error: divide by zero\n  in: "));
        assert!(rendered.contains("HERE(0)"));
    }

    #[test]
    fn errors_are_cloneable_for_sticky_re_raise() {
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "early eof"));
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
