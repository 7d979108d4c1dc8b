//! HTTP transport for routehttp-rs.
//!
//! Accepts connections, parses one request per connection, hands it to the
//! router and copies the routed response back to the socket.

mod response;
mod config;
mod error;
mod output;
mod http_server;

// Re-export public items
pub use response::{HttpResponse, StatusCode};
pub use config::ServerConfig;
pub use error::Error;
pub use output::{OutputEnv, OutputSink, Responder};
pub use http_server::HttpServer;
