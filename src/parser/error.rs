//! Error types for the request parser.

use thiserror::Error;

/// Errors that can occur while turning raw bytes into an [`HttpRequest`](crate::parser::HttpRequest).
#[derive(Debug, Error)]
pub enum Error {
    /// The method token is not one the parser knows.
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// The request target is empty or not origin-form.
    #[error("Invalid request target: {0}")]
    InvalidTarget(String),

    /// The request line does not have exactly three parts.
    #[error("Malformed request line: {0}")]
    MalformedRequestLine(String),

    /// The version token is not supported.
    #[error("Invalid HTTP version: {0}")]
    InvalidVersion(String),

    /// A header required by the protocol version is missing.
    #[error("Required header is missing: {0}")]
    MissingHeader(String),

    /// A header line has no `:` separator.
    #[error("Invalid header line: {0}")]
    InvalidHeaderFormat(String),

    /// No bytes, or no request line.
    #[error("Empty request")]
    EmptyRequest,

    /// The body could not be decoded as JSON.
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}
