//! Request routing for a small HTTP/1.x server.
//!
//! Routes are registered on a [`Router`] while the server is stopped. When the
//! server starts, every route's action list is compiled into a handler chain
//! plus filters and monitors, and requests are resolved through a segment
//! matcher backed by an LRU cache.
//!
//! # Features
//!
//! - `{name}` placeholders and `/?` optional trailing slashes that redirect
//! - Global actions, sub-router import and route prefixes
//! - Fallthrough handler chains; handlers may answer later through a future
//! - 405 responses carrying an `Allow` header
//! - A Tokio server with connection limiting and graceful shutdown
//!
//! # Examples
//!
//! ## Routing
//!
//! ```
//! use routehttp_rs::router::{Action, Reply, ServerOptions, ServerState};
//! use routehttp_rs::{HttpRequest, HttpResponse, Router, StatusCode};
//!
//! let mut router = Router::new();
//! router
//!     .route("GET", "/users/{id}/?", [Action::from_fn(|_req, args| {
//!         Ok(Reply::from(HttpResponse::new(StatusCode::Ok).with_body_string(format!("user {}", args["id"]))))
//!     })])
//!     .unwrap();
//! router
//!     .attach(Action::filter_fn(|_req, response, _args| response.with_header("X-Powered-By", "routehttp-rs")))
//!     .unwrap();
//!
//! router.update(ServerState::Starting, &mut ServerOptions::default()).unwrap();
//!
//! let routed = router.dispatch(HttpRequest::get("/users/7")).unwrap().unwrap();
//! let response = routed.ready().unwrap();
//! assert_eq!(response.body, b"user 7");
//! assert_eq!(response.header("X-Powered-By"), Some("routehttp-rs"));
//!
//! let redirect = router.dispatch(HttpRequest::get("/users/7/")).unwrap().unwrap();
//! assert_eq!(redirect.ready().unwrap().header("Location"), Some("/users/7"));
//!
//! assert!(router.dispatch(HttpRequest::get("/teams")).unwrap().is_none());
//! ```
//!
//! ## Parsing
//!
//! ```
//! use routehttp_rs::{parse_request, ParserError};
//!
//! let request = parse_request(b"GET /search?q=rust HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
//! assert_eq!(request.path, "/search");
//! assert_eq!(request.query.as_deref(), Some("q=rust"));
//!
//! match parse_request(b"GET/ /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n") {
//!     Err(ParserError::InvalidMethod(method)) => assert_eq!(method, "GET/"),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```
//!
//! See `demos/routing_server.rs` for a complete server.

pub mod parser;
pub mod router;
pub mod server;

// Re-export commonly used items for convenience
pub use parser::{Error as ParserError, HttpRequest, HttpVersion, Method, parse_request};
pub use router::{Action, Reply, RouteError, Router};
pub use server::{Error as ServerError, HttpResponse, HttpServer, ServerConfig, StatusCode};
