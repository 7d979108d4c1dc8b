//! Error types for route registration, startup and dispatch.

use thiserror::Error;

/// Errors raised by the router.
///
/// Configuration and startup errors surface while the route table is being
/// built; the rest surface per request.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Invalid option, empty method or action list, or registration after start.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A bootable action booted into something that is neither handler nor filter.
    #[error("Bootable {name} must boot into a handler and/or a filter")]
    BootFailed { name: String },

    /// The Stopped -> Starting transition could not complete.
    #[error("Startup failed: {0}")]
    Startup(String),

    /// Every handler of a fallthrough chain declined to respond.
    #[error("No handler produced a response")]
    NoResponse,

    /// An application handler failed.
    #[error("Handler failed: {0}")]
    Handler(String),

    /// The pending computation behind a deferred response was cancelled.
    #[error("Pending response was cancelled")]
    Cancelled,

    /// A handler answered asynchronously but no Tokio runtime is running.
    #[error("Deferred response needs a Tokio runtime: {0}")]
    NoRuntime(String),

    /// The matcher broke its contract.
    #[error("Internal routing error: {0}")]
    Internal(String),
}
