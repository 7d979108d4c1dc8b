//! Actions: the units a route is built from.
//!
//! An [`Action`] is a capability record. Each capability (handler, filter,
//! bootable, monitor) is an optional trait object, so one value can play
//! several roles on the same route:
//!
//! ```
//! use std::sync::Arc;
//! use routehttp_rs::router::{Action, Filter, Monitor, RouteArgs};
//! use routehttp_rs::{HttpRequest, HttpResponse};
//!
//! struct Stamp;
//!
//! impl Filter for Stamp {
//!     fn filter(&self, _req: &HttpRequest, response: HttpResponse, _args: &RouteArgs) -> HttpResponse {
//!         response.with_header("X-Stamp", "1")
//!     }
//! }
//!
//! impl Monitor for Stamp {
//!     fn snapshot(&self) -> serde_json::Value {
//!         serde_json::json!({ "stamped": true })
//!     }
//! }
//!
//! let stamp = Arc::new(Stamp);
//! let action = Action::new().with_filter(stamp.clone()).with_monitor(stamp);
//! assert!(action.filter().is_some() && action.monitor().is_some());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::parser::HttpRequest;
use crate::router::error::RouteError;
use crate::router::lifecycle::ServerOptions;
use crate::server::HttpResponse;

/// Placeholder values captured by the matcher, keyed by placeholder name.
pub type RouteArgs = HashMap<String, String>;

/// A response that is not known yet. `Ok(None)` means the handler declined.
pub type PendingResponse = Pin<Box<dyn Future<Output = Result<Option<HttpResponse>, RouteError>> + Send>>;

/// What a handler produced.
pub enum Reply {
    /// The handler declined; the next handler in the chain gets a turn.
    Empty,
    /// A response is available now.
    Ready(HttpResponse),
    /// The response will be available later.
    Pending(PendingResponse),
}

impl Reply {
    /// Wrap a future as a pending reply.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<Option<HttpResponse>, RouteError>> + Send + 'static,
    {
        Reply::Pending(Box::pin(future))
    }

    /// Wait for whatever this reply stands for.
    pub(crate) async fn settle(self) -> Result<Option<HttpResponse>, RouteError> {
        match self {
            Reply::Empty => Ok(None),
            Reply::Ready(response) => Ok(Some(response)),
            Reply::Pending(pending) => pending.await,
        }
    }
}

impl From<HttpResponse> for Reply {
    fn from(response: HttpResponse) -> Self {
        Reply::Ready(response)
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Empty => f.write_str("Empty"),
            Reply::Ready(response) => f.debug_tuple("Ready").field(&response.status).finish(),
            Reply::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Produces a reply for a routed request.
pub trait Handler: Send + Sync {
    fn call(&self, request: &Arc<HttpRequest>, args: &Arc<RouteArgs>) -> Result<Reply, RouteError>;
}

/// Post-processes the response a handler produced.
pub trait Filter: Send + Sync {
    fn filter(&self, request: &HttpRequest, response: HttpResponse, args: &RouteArgs) -> HttpResponse;
}

/// An action that needs one-time initialization when the server starts.
///
/// `boot` runs at most once per start, however many routes share the action.
/// Returning `Ok(None)` keeps the action's own handler and filter; returning
/// an action replaces them with that action's handler and filter, and it must
/// carry at least one of the two.
pub trait Bootable: Send + Sync {
    fn boot(&self, options: &ServerOptions) -> Result<Option<Action>, RouteError>;

    /// Name used in error messages.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Exposes a diagnostic snapshot through [`Router::monitor`](crate::router::Router::monitor).
pub trait Monitor: Send + Sync {
    fn snapshot(&self) -> serde_json::Value;

    /// Grouping key for the monitor report.
    fn kind(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: Fn(&Arc<HttpRequest>, &Arc<RouteArgs>) -> Result<Reply, RouteError> + Send + Sync,
{
    fn call(&self, request: &Arc<HttpRequest>, args: &Arc<RouteArgs>) -> Result<Reply, RouteError> {
        (self.0)(request, args)
    }
}

struct FnFilter<F>(F);

impl<F> Filter for FnFilter<F>
where
    F: Fn(&HttpRequest, HttpResponse, &RouteArgs) -> HttpResponse + Send + Sync,
{
    fn filter(&self, request: &HttpRequest, response: HttpResponse, args: &RouteArgs) -> HttpResponse {
        (self.0)(request, response, args)
    }
}

static NEXT_ACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an action record. Clones of an [`Action`] share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(u64);

impl ActionId {
    fn next() -> Self {
        ActionId(NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A capability record attached to routes.
#[derive(Clone)]
pub struct Action {
    id: ActionId,
    handler: Option<Arc<dyn Handler>>,
    filter: Option<Arc<dyn Filter>>,
    bootable: Option<Arc<dyn Bootable>>,
    monitor: Option<Arc<dyn Monitor>>,
}

impl Action {
    /// An action with no capabilities yet.
    pub fn new() -> Self {
        Self {
            id: ActionId::next(),
            handler: None,
            filter: None,
            bootable: None,
            monitor: None,
        }
    }

    pub fn from_handler(handler: impl Handler + 'static) -> Self {
        Self::new().with_handler(Arc::new(handler))
    }

    /// A handler from a closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Arc<HttpRequest>, &Arc<RouteArgs>) -> Result<Reply, RouteError> + Send + Sync + 'static,
    {
        Self::new().with_handler(Arc::new(FnHandler(f)))
    }

    pub fn from_filter(filter: impl Filter + 'static) -> Self {
        Self::new().with_filter(Arc::new(filter))
    }

    /// A filter from a closure.
    pub fn filter_fn<F>(f: F) -> Self
    where
        F: Fn(&HttpRequest, HttpResponse, &RouteArgs) -> HttpResponse + Send + Sync + 'static,
    {
        Self::new().with_filter(Arc::new(FnFilter(f)))
    }

    pub fn from_bootable(bootable: impl Bootable + 'static) -> Self {
        Self::new().with_bootable(Arc::new(bootable))
    }

    pub fn from_monitor(monitor: impl Monitor + 'static) -> Self {
        Self::new().with_monitor(Arc::new(monitor))
    }

    pub fn with_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_bootable(mut self, bootable: Arc<dyn Bootable>) -> Self {
        self.bootable = Some(bootable);
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn handler(&self) -> Option<&Arc<dyn Handler>> {
        self.handler.as_ref()
    }

    pub fn filter(&self) -> Option<&Arc<dyn Filter>> {
        self.filter.as_ref()
    }

    pub fn bootable(&self) -> Option<&Arc<dyn Bootable>> {
        self.bootable.as_ref()
    }

    pub fn monitor(&self) -> Option<&Arc<dyn Monitor>> {
        self.monitor.as_ref()
    }

    /// True when the record has no capability at all.
    pub fn is_empty(&self) -> bool {
        self.handler.is_none() && self.filter.is_none() && self.bootable.is_none() && self.monitor.is_none()
    }
}

impl Default for Action {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("handler", &self.handler.is_some())
            .field("filter", &self.filter.is_some())
            .field("bootable", &self.bootable.is_some())
            .field("monitor", &self.monitor.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::StatusCode;

    #[test]
    fn test_clones_share_identity() {
        let action = Action::from_fn(|_req, _args| Ok(Reply::Empty));
        let copy = action.clone();
        assert_eq!(action.id(), copy.id());
        assert_ne!(action.id(), Action::new().id());
    }

    #[test]
    fn test_empty_record() {
        assert!(Action::new().is_empty());
        assert!(!Action::filter_fn(|_req, resp, _args| resp).is_empty());
    }

    #[tokio::test]
    async fn test_reply_settles() {
        let ready = Reply::from(HttpResponse::new(StatusCode::Ok)).settle().await.unwrap();
        assert_eq!(ready.unwrap().status, StatusCode::Ok);

        assert!(Reply::Empty.settle().await.unwrap().is_none());

        let pending = Reply::pending(async { Ok::<_, RouteError>(Some(HttpResponse::new(StatusCode::Accepted))) });
        assert_eq!(pending.settle().await.unwrap().unwrap().status, StatusCode::Accepted);
    }
}
