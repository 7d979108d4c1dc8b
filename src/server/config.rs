//! Server configuration.

use std::net::SocketAddr;
use serde::Deserialize;

use crate::server::error::Error;

/// HTTP server configuration.
///
/// Every field has a default, so a JSON document only needs to name what it
/// overrides:
///
/// ```
/// use routehttp_rs::ServerConfig;
///
/// let config = ServerConfig::from_json(r#"{ "max_cache_entries": 0 }"#).unwrap();
/// assert_eq!(config.max_cache_entries, 0);
/// assert_eq!(config.max_connections, 1024);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The address to bind to.
    pub addr: SocketAddr,
    /// The maximum number of concurrent connections.
    pub max_connections: usize,
    /// The read buffer size.
    pub read_buffer_size: usize,
    /// Capacity of the router's resolved-route cache; 0 disables it.
    pub max_cache_entries: usize,
    /// Upper-case route methods before they are compiled and published.
    pub normalize_method_case: bool,
    /// Methods the server accepts before any route is registered.
    pub allowed_methods: Vec<String>,
    /// Sent as the `Server` header.
    pub server_name: String,
}

impl ServerConfig {
    /// Load a configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_connections: 1024,
            read_buffer_size: 8192,
            max_cache_entries: 512,
            normalize_method_case: true,
            allowed_methods: ["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .into_iter()
                .map(String::from)
                .collect(),
            server_name: "routehttp-rs".to_string(),
        }
    }
}
