//! Request model and wire parser.
//!
//! The router only needs a method, a path and a query string; the parser here
//! is the smallest thing that produces those from an HTTP/1.x request head.

mod request;
mod method;
mod version;
mod error;

// Re-export public items
pub use request::{HttpRequest, parse_request};
pub use method::Method;
pub use version::HttpVersion;
pub use error::Error;
