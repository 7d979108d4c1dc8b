//! Error types for the HTTP server.

use thiserror::Error;

use crate::parser::Error as ParserError;
use crate::router::RouteError;

/// Errors that can occur during HTTP server operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Error parsing an HTTP request.
    #[error("Parse error: {0}")]
    ParseError(#[from] ParserError),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Routing, startup or handler failure.
    #[error("Routing error: {0}")]
    Route(#[from] RouteError),

    /// The configuration could not be loaded.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// `write` was called on a response that was never prepared.
    #[error("Response written before it was prepared")]
    NotPrepared,

    /// `write` was called on a deferred response that has not resolved yet.
    #[error("Response written before it was resolved")]
    Unresolved,

    /// The connection's output channel is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
