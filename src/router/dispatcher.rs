//! Per-request resolution of compiled routes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error};

use crate::parser::HttpRequest;
use crate::router::action::{Reply, RouteArgs};
use crate::router::bridge::{DispatchContext, ResponseBridge};
use crate::router::cache::RouteCache;
use crate::router::compile::CompiledRoute;
use crate::router::error::RouteError;
use crate::router::matcher::{MatchOutcome, Matcher};
use crate::server::{Error, HttpResponse, OutputEnv, Responder, StatusCode};

/// method -> uri pattern -> monitor kind -> snapshots
pub type MonitorReport = BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<serde_json::Value>>>>;

/// What [`Dispatcher::resolve`] hands to the transport.
pub enum RouteResponse {
    Ready(HttpResponse),
    Deferred(ResponseBridge),
}

impl RouteResponse {
    /// The response, when it is already known.
    pub fn ready(&self) -> Option<&HttpResponse> {
        match self {
            RouteResponse::Ready(response) => Some(response),
            RouteResponse::Deferred(_) => None,
        }
    }
}

impl Responder for RouteResponse {
    fn prepare(&mut self, env: OutputEnv) {
        match self {
            RouteResponse::Ready(response) => response.prepare(env),
            RouteResponse::Deferred(bridge) => bridge.prepare(env),
        }
    }

    fn assume_socket_control(&mut self) {
        match self {
            RouteResponse::Ready(response) => response.assume_socket_control(),
            RouteResponse::Deferred(bridge) => bridge.assume_socket_control(),
        }
    }

    fn write(&mut self) -> Result<bool, Error> {
        match self {
            RouteResponse::Ready(response) => response.write(),
            RouteResponse::Deferred(bridge) => bridge.write(),
        }
    }
}

/// A compiled route together with the pattern it was registered under.
pub(crate) struct RouteEntry {
    pub(crate) method: String,
    pub(crate) uri: String,
    pub(crate) compiled: Arc<CompiledRoute>,
}

/// A route picked for a request.
#[derive(Clone)]
pub(crate) struct Resolved {
    pub(crate) route: Arc<CompiledRoute>,
    pub(crate) args: Arc<RouteArgs>,
}

pub(crate) enum Lookup {
    Route(Resolved),
    NotFound,
    MethodNotAllowed(Vec<String>),
}

/// Resolves requests against the compiled route table.
///
/// Built once at startup; only its cache changes afterwards.
pub struct Dispatcher {
    routes: Vec<RouteEntry>,
    matcher: Box<dyn Matcher>,
    cache: Mutex<RouteCache<Resolved>>,
}

impl Dispatcher {
    pub(crate) fn new(routes: Vec<RouteEntry>, matcher: Box<dyn Matcher>, max_cache_entries: usize) -> Self {
        Self {
            routes,
            matcher,
            cache: Mutex::new(RouteCache::new(max_cache_entries)),
        }
    }

    fn cache(&self) -> MutexGuard<'_, RouteCache<Resolved>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_cache_capacity(&self, capacity: usize) {
        self.cache().set_capacity(capacity);
    }

    /// Number of resolved routes currently cached.
    pub fn cached_routes(&self) -> usize {
        self.cache().len()
    }

    pub(crate) fn lookup(&self, method: &str, path: &str) -> Result<Lookup, RouteError> {
        let key = RouteCache::<Resolved>::key(method, path);
        if let Some(hit) = self.cache().get(&key) {
            return Ok(Lookup::Route(hit));
        }

        match self.matcher.dispatch(method, path) {
            MatchOutcome::Found(index, args) => {
                let entry = self.routes.get(index).ok_or_else(|| {
                    RouteError::Internal(format!("matcher returned unknown route #{index} for {method} {path}"))
                })?;
                let resolved = Resolved {
                    route: Arc::clone(&entry.compiled),
                    args: Arc::new(args),
                };
                self.cache().insert(key, resolved.clone());
                Ok(Lookup::Route(resolved))
            }
            MatchOutcome::NotFound => Ok(Lookup::NotFound),
            MatchOutcome::MethodNotAllowed(methods) => Ok(Lookup::MethodNotAllowed(methods)),
        }
    }

    /// Resolve a request to a response.
    ///
    /// `Ok(None)` means no route (or no handler) answered and the caller's
    /// fallback should produce the final response.
    pub fn resolve(&self, request: HttpRequest) -> Result<Option<RouteResponse>, RouteError> {
        let resolved = match self.lookup(request.method.as_str(), &request.path)? {
            Lookup::Route(resolved) => resolved,
            Lookup::NotFound => return Ok(None),
            Lookup::MethodNotAllowed(methods) => {
                debug!("{} not allowed for {}, allowed: {methods:?}", request.method, request.path);
                let response = HttpResponse::generic(StatusCode::MethodNotAllowed)
                    .with_header("Allow", methods.join(", "));
                return Ok(Some(RouteResponse::Ready(response)));
            }
        };

        let request = Arc::new(request);
        let Resolved { route, args } = resolved;
        match route.call(&request, &args)? {
            Reply::Empty => Ok(None),
            Reply::Ready(response) => Ok(Some(RouteResponse::Ready(route.apply_filters(&request, response, &args)))),
            Reply::Pending(pending) => {
                let context = Arc::new(RouteContext { request, route });
                Ok(Some(RouteResponse::Deferred(ResponseBridge::new(context, args, pending)?)))
            }
        }
    }

    pub fn monitor(&self) -> MonitorReport {
        let mut report = MonitorReport::new();
        for entry in &self.routes {
            let by_kind = report
                .entry(entry.method.clone())
                .or_default()
                .entry(entry.uri.clone())
                .or_default();
            for (kind, monitors) in entry.compiled.monitors() {
                by_kind
                    .entry(kind.to_string())
                    .or_default()
                    .extend(monitors.iter().map(|monitor| monitor.snapshot()));
            }
        }
        report
    }
}

/// Finishes a deferred response for one request: filters on success, a
/// generic 500 on failure.
struct RouteContext {
    request: Arc<HttpRequest>,
    route: Arc<CompiledRoute>,
}

impl DispatchContext for RouteContext {
    fn respond(&self, args: &RouteArgs, response: Option<HttpResponse>) -> Result<Box<dyn Responder>, RouteError> {
        let response = response.ok_or(RouteError::NoResponse)?;
        Ok(Box::new(self.route.apply_filters(&self.request, response, args)))
    }

    fn respond_error(&self, e: RouteError) -> Box<dyn Responder> {
        error!("{} {} failed: {e}", self.request.method, self.request.path);
        Box::new(HttpResponse::generic(StatusCode::InternalServerError))
    }
}
