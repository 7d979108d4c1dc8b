//! Route table construction, chain compilation and request dispatch.
//!
//! A [`Router`] collects routes while the server is stopped. When the server
//! moves to [`ServerState::Starting`] every route's actions are compiled into
//! a single handler chain plus filters, the matcher is built, and the router
//! starts answering [`Router::dispatch`]. Chains that answer asynchronously
//! are wrapped in a [`ResponseBridge`] so the transport can drive them with
//! the same calls it uses for ready responses.

mod action;
mod bridge;
mod builder;
mod cache;
mod compile;
mod dispatcher;
mod error;
mod lifecycle;
mod matcher;

pub use action::{Action, ActionId, Bootable, Filter, Handler, Monitor, PendingResponse, Reply, RouteArgs};
pub use bridge::{DispatchContext, ResponseBridge};
pub use builder::{Attachment, RouteDefinition, Router, MAX_CACHE_ENTRIES};
pub use cache::RouteCache;
pub use compile::CompiledRoute;
pub use dispatcher::{Dispatcher, MonitorReport, RouteResponse};
pub use error::RouteError;
pub use lifecycle::{ServerOptions, ServerState};
pub use matcher::{MatchOutcome, Matcher, RouteKey, SegmentMatcher};
