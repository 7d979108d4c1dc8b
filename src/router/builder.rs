//! Route registration and the Stopped -> Starting transition.

use std::sync::Arc;

use log::{debug, info};
use serde_json::Value;

use crate::parser::HttpRequest;
use crate::router::action::{Action, Handler, Reply, RouteArgs};
use crate::router::compile::Compiler;
use crate::router::dispatcher::{Dispatcher, MonitorReport, RouteEntry, RouteResponse};
use crate::router::error::RouteError;
use crate::router::lifecycle::{ServerOptions, ServerState};
use crate::router::matcher::SegmentMatcher;
use crate::server::HttpResponse;

/// Option key accepted by [`Router::set_option`].
pub const MAX_CACHE_ENTRIES: &str = "maxCacheEntries";

const DEFAULT_MAX_CACHE_ENTRIES: usize = 512;

/// A (method, uri pattern) pair and the actions bound to it.
#[derive(Debug, Clone)]
pub struct RouteDefinition {
    pub method: String,
    pub uri: String,
    pub actions: Vec<Action>,
}

/// Something [`Router::attach`] accepts.
pub enum Attachment {
    Action(Action),
    Router(Router),
}

impl From<Action> for Attachment {
    fn from(action: Action) -> Self {
        Attachment::Action(action)
    }
}

impl From<Router> for Attachment {
    fn from(router: Router) -> Self {
        Attachment::Router(router)
    }
}

/// Collects routes while the server is stopped and serves them once started.
///
/// ```
/// use routehttp_rs::router::{Action, Reply, Router, ServerOptions, ServerState};
/// use routehttp_rs::{HttpRequest, HttpResponse, StatusCode};
///
/// let mut router = Router::new();
/// router
///     .route("GET", "/hello/{name}", [Action::from_fn(|_req, args| {
///         Ok(Reply::from(HttpResponse::new(StatusCode::Ok).with_body_string(format!("hi {}", args["name"]))))
///     })])
///     .unwrap();
///
/// let mut options = ServerOptions::default();
/// router.update(ServerState::Starting, &mut options).unwrap();
///
/// let routed = router.dispatch(HttpRequest::get("/hello/ana")).unwrap().unwrap();
/// assert_eq!(routed.ready().unwrap().body, b"hi ana");
/// assert_eq!(options.allowed_methods, vec!["GET"]);
/// ```
pub struct Router {
    state: ServerState,
    routes: Vec<RouteDefinition>,
    globals: Vec<Action>,
    max_cache_entries: usize,
    dispatcher: Option<Dispatcher>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            state: ServerState::Stopped,
            routes: Vec::new(),
            globals: Vec::new(),
            max_cache_entries: DEFAULT_MAX_CACHE_ENTRIES,
            dispatcher: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Registered routes in registration order.
    pub fn routes(&self) -> &[RouteDefinition] {
        &self.routes
    }

    /// Actions that every route registered from now on starts with.
    pub fn global_actions(&self) -> &[Action] {
        &self.globals
    }

    fn ensure_stopped(&self, what: &str) -> Result<(), RouteError> {
        if self.state == ServerState::Stopped {
            Ok(())
        } else {
            Err(RouteError::Config(format!(
                "cannot {what} while the server is {:?}; routes are fixed once it starts",
                self.state
            )))
        }
    }

    /// Bind `actions` to `method` and `uri`.
    ///
    /// A `uri` ending in `/?` registers the path without the trailing slash
    /// plus a second route, with the slash, that redirects to it.
    pub fn route(
        &mut self,
        method: &str,
        uri: &str,
        actions: impl IntoIterator<Item = Action>,
    ) -> Result<&mut Self, RouteError> {
        self.ensure_stopped("add routes")?;
        if method.is_empty() {
            return Err(RouteError::Config("route method must not be empty".to_string()));
        }
        let actions: Vec<Action> = actions.into_iter().collect();
        if actions.is_empty() {
            return Err(RouteError::Config(format!("route {method} {uri} needs at least one action")));
        }

        let uri = if uri.starts_with('/') {
            uri.to_string()
        } else {
            format!("/{uri}")
        };

        let mut effective = self.globals.clone();
        effective.extend(actions);

        if uri == "/?" {
            self.push(method, "/".to_string(), effective);
        } else if let Some(canonical) = uri.strip_suffix("/?") {
            let redirect_uri = format!("{canonical}/");
            self.push(method, canonical.to_string(), effective);
            self.push(method, redirect_uri, vec![Action::from_handler(TrailingSlashRedirect)]);
        } else {
            self.push(method, uri, effective);
        }
        Ok(self)
    }

    fn push(&mut self, method: &str, uri: String, actions: Vec<Action>) {
        debug!("Registered route {method} {uri} with {} action(s)", actions.len());
        self.routes.push(RouteDefinition {
            method: method.to_string(),
            uri,
            actions,
        });
    }

    /// Attach a global action, or import another router's routes.
    ///
    /// A global action is appended to every route registered so far and
    /// prepended to every route registered later. An imported router
    /// contributes its routes only, each prefixed with this router's current
    /// global actions.
    pub fn attach(&mut self, item: impl Into<Attachment>) -> Result<&mut Self, RouteError> {
        self.ensure_stopped("attach actions")?;
        match item.into() {
            Attachment::Router(other) => {
                for route in other.routes {
                    let mut actions = self.globals.clone();
                    actions.extend(route.actions);
                    self.push(&route.method, route.uri, actions);
                }
            }
            Attachment::Action(action) => {
                if action.is_empty() {
                    return Err(RouteError::Config(
                        "action must be a handler, filter, bootable or monitor".to_string(),
                    ));
                }
                for route in &mut self.routes {
                    route.actions.push(action.clone());
                }
                self.globals.push(action);
            }
        }
        Ok(self)
    }

    /// Move every registered route under `/{prefix}`.
    ///
    /// Global actions stop propagating to routes registered afterwards.
    pub fn prefix(&mut self, prefix: &str) -> Result<&mut Self, RouteError> {
        self.ensure_stopped("prefix routes")?;
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            return Ok(self);
        }
        for route in &mut self.routes {
            route.uri = format!("/{prefix}{}", route.uri);
        }
        self.globals.clear();
        Ok(self)
    }

    /// Set a router option. Only [`MAX_CACHE_ENTRIES`] is recognised.
    pub fn set_option(&mut self, key: &str, value: impl Into<Value>) -> Result<(), RouteError> {
        match key {
            MAX_CACHE_ENTRIES => {
                let value = value.into();
                let capacity = value
                    .as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| {
                        RouteError::Config(format!("{MAX_CACHE_ENTRIES} must be a non-negative integer, got {value}"))
                    })?;
                self.max_cache_entries = capacity;
                if let Some(dispatcher) = &self.dispatcher {
                    dispatcher.set_cache_capacity(capacity);
                }
                Ok(())
            }
            _ => Err(RouteError::Config(format!("unknown router option {key:?}"))),
        }
    }

    pub fn max_cache_entries(&self) -> usize {
        self.max_cache_entries
    }

    /// Observe a server lifecycle transition.
    ///
    /// Moving to `Starting` compiles every route, builds the matcher and
    /// publishes the routed methods into `options.allowed_methods`. It fails
    /// when no route is registered or a bootable misbehaves; the router then
    /// stays stopped.
    pub fn update(&mut self, state: ServerState, options: &mut ServerOptions) -> Result<(), RouteError> {
        if state == ServerState::Starting && self.state == ServerState::Stopped {
            self.start(options)?;
        }
        self.state = state;
        Ok(())
    }

    fn start(&mut self, options: &mut ServerOptions) -> Result<(), RouteError> {
        if self.routes.is_empty() {
            return Err(RouteError::Startup(
                "no routes registered; add at least one route before starting".to_string(),
            ));
        }

        let mut compiler = Compiler::new(options);
        let mut matcher = SegmentMatcher::new();
        let mut entries = Vec::with_capacity(self.routes.len());
        for (key, route) in self.routes.iter().enumerate() {
            let method = options.normalize_method(&route.method);
            let compiled = compiler.compile(&route.actions)?;
            matcher.add(&method, &route.uri, key);
            entries.push(RouteEntry {
                method,
                uri: route.uri.clone(),
                compiled: Arc::new(compiled),
            });
        }

        info!("Registered endpoints:");
        for entry in &entries {
            info!("  {} {}", entry.method, entry.uri);
        }

        let methods: Vec<String> = entries.iter().map(|entry| entry.method.clone()).collect();
        options.publish_methods(methods.iter().map(String::as_str));

        self.dispatcher = Some(Dispatcher::new(entries, Box::new(matcher), self.max_cache_entries));
        Ok(())
    }

    /// The dispatcher built at startup.
    pub fn dispatcher(&self) -> Option<&Dispatcher> {
        self.dispatcher.as_ref()
    }

    /// Resolve a request; see [`Dispatcher::resolve`].
    pub fn dispatch(&self, request: HttpRequest) -> Result<Option<RouteResponse>, RouteError> {
        self.dispatcher
            .as_ref()
            .ok_or_else(|| RouteError::Config("router has not been started".to_string()))?
            .resolve(request)
    }

    /// Snapshots of every monitor, by method, uri and monitor kind.
    ///
    /// Empty until the router has started.
    pub fn monitor(&self) -> MonitorReport {
        self.dispatcher
            .as_ref()
            .map(Dispatcher::monitor)
            .unwrap_or_default()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Answers `/foo/` (and `/foo/?q`) with a redirect to `/foo` (and `/foo?q`).
struct TrailingSlashRedirect;

impl Handler for TrailingSlashRedirect {
    fn call(&self, request: &Arc<HttpRequest>, _args: &Arc<RouteArgs>) -> Result<Reply, RouteError> {
        let path = request.path.strip_suffix('/').unwrap_or(&request.path);
        let location = match &request.query {
            Some(query) => format!("{path}?{query}"),
            None => path.to_string(),
        };
        Ok(Reply::Ready(HttpResponse::redirect(location)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::action::ActionId;
    use crate::server::StatusCode;

    fn ok(body: &'static str) -> Action {
        Action::from_fn(move |_req, _args| Ok(Reply::from(HttpResponse::new(StatusCode::Ok).with_body_string(body))))
    }

    fn tag(name: &'static str) -> Action {
        Action::filter_fn(move |_req, resp, _args| resp.with_header("X-Tag", name))
    }

    fn ids(route: &RouteDefinition) -> Vec<ActionId> {
        route.actions.iter().map(Action::id).collect()
    }

    fn start(router: &mut Router) -> ServerOptions {
        let mut options = ServerOptions::default();
        router.update(ServerState::Starting, &mut options).unwrap();
        options
    }

    fn body(router: &Router, target: &str) -> Vec<u8> {
        router
            .dispatch(HttpRequest::get(target))
            .unwrap()
            .and_then(|routed| routed.ready().map(|response| response.body.clone()))
            .unwrap_or_default()
    }

    #[test]
    fn test_route_validation() {
        let mut router = Router::new();
        assert!(matches!(router.route("", "/a", [ok("a")]), Err(RouteError::Config(_))));
        assert!(matches!(router.route("GET", "/a", Vec::new()), Err(RouteError::Config(_))));
        assert!(router.routes().is_empty());
    }

    #[test]
    fn test_uri_gets_leading_slash() {
        let mut router = Router::new();
        router.route("GET", "users", [ok("u")]).unwrap();
        assert_eq!(router.routes()[0].uri, "/users");
    }

    #[test]
    fn test_bare_optional_slash_is_root() {
        let mut router = Router::new();
        router.route("GET", "/?", [ok("root")]).unwrap();
        assert_eq!(router.routes().len(), 1);
        assert_eq!(router.routes()[0].uri, "/");
    }

    #[test]
    fn test_optional_trailing_slash_registers_redirect_pair() {
        let mut router = Router::new();
        router.route("GET", "/foo/?", [ok("foo")]).unwrap();
        let uris: Vec<&str> = router.routes().iter().map(|r| r.uri.as_str()).collect();
        assert_eq!(uris, vec!["/foo", "/foo/"]);

        start(&mut router);
        assert_eq!(body(&router, "/foo"), b"foo");

        let redirect = router.dispatch(HttpRequest::get("/foo/?x=1")).unwrap().unwrap();
        let redirect = redirect.ready().unwrap();
        assert_eq!(redirect.status, StatusCode::Found);
        assert_eq!(redirect.header("Location"), Some("/foo?x=1"));

        let bare = router.dispatch(HttpRequest::get("/foo/")).unwrap().unwrap();
        assert_eq!(bare.ready().unwrap().header("Location"), Some("/foo"));
    }

    #[test]
    fn test_redirect_uses_the_actual_request_path() {
        let mut router = Router::new();
        router.route("GET", "/users/{id}/?", [ok("user")]).unwrap();
        start(&mut router);

        let redirect = router.dispatch(HttpRequest::get("/users/42/")).unwrap().unwrap();
        assert_eq!(redirect.ready().unwrap().header("Location"), Some("/users/42"));
    }

    #[test]
    fn test_global_action_ordering() {
        let mut router = Router::new();
        let (h1, h2, a, b) = (ok("1"), ok("2"), tag("a"), tag("b"));

        router.route("GET", "/one", [h1.clone()]).unwrap();
        router.attach(a.clone()).unwrap();
        router.route("GET", "/two", [h2.clone()]).unwrap();
        router.attach(b.clone()).unwrap();

        let routes = router.routes();
        assert_eq!(ids(&routes[0]), vec![h1.id(), a.id(), b.id()]);
        assert_eq!(ids(&routes[1]), vec![a.id(), h2.id(), b.id()]);
        let globals: Vec<ActionId> = router.global_actions().iter().map(Action::id).collect();
        assert_eq!(globals, vec![a.id(), b.id()]);
    }

    #[test]
    fn test_redirect_route_gets_later_globals_only() {
        let mut router = Router::new();
        let (early, late) = (tag("early"), tag("late"));
        router.attach(early.clone()).unwrap();
        router.route("GET", "/foo/?", [ok("foo")]).unwrap();
        router.attach(late.clone()).unwrap();

        let routes = router.routes();
        assert_eq!(routes[0].actions.first().map(Action::id), Some(early.id()));
        assert_eq!(routes[1].actions.len(), 2);
        assert_eq!(routes[1].actions[1].id(), late.id());
    }

    #[test]
    fn test_attach_rejects_empty_action() {
        let mut router = Router::new();
        assert!(matches!(router.attach(Action::new()), Err(RouteError::Config(_))));
    }

    #[test]
    fn test_import_prepends_importer_globals_only() {
        let mut sub = Router::new();
        let (sub_global, sub_handler) = (tag("sub"), ok("sub"));
        sub.attach(sub_global.clone()).unwrap();
        sub.route("GET", "/child", [sub_handler.clone()]).unwrap();
        sub.attach(tag("sub-late")).unwrap();
        let sub_route_ids = ids(&sub.routes()[0]);

        let mut main = Router::new();
        let main_global = tag("main");
        main.attach(main_global.clone()).unwrap();
        main.attach(sub).unwrap();

        assert_eq!(main.routes().len(), 1);
        let mut expected = vec![main_global.id()];
        expected.extend(sub_route_ids);
        assert_eq!(ids(&main.routes()[0]), expected);
        assert_eq!(main.global_actions().len(), 1);
    }

    #[test]
    fn test_prefix_rewrites_uris_and_cuts_globals() {
        let mut router = Router::new();
        let global = tag("g");
        router.attach(global.clone()).unwrap();
        router.route("GET", "/users", [ok("users")]).unwrap();
        router.prefix("/api/").unwrap();
        router.route("GET", "/health", [ok("health")]).unwrap();

        let routes = router.routes();
        assert_eq!(routes[0].uri, "/api/users");
        assert_eq!(routes[0].actions[0].id(), global.id());
        assert_eq!(routes[1].uri, "/health");
        assert_eq!(routes[1].actions.len(), 1);
        assert!(router.global_actions().is_empty());
    }

    #[test]
    fn test_empty_prefix_is_a_no_op() {
        let mut router = Router::new();
        router.attach(tag("g")).unwrap();
        router.route("GET", "/users", [ok("users")]).unwrap();
        router.prefix("//").unwrap();
        assert_eq!(router.routes()[0].uri, "/users");
        assert_eq!(router.global_actions().len(), 1);
    }

    #[test]
    fn test_start_without_routes_fails() {
        let mut router = Router::new();
        let mut options = ServerOptions::default();
        let result = router.update(ServerState::Starting, &mut options);
        assert!(matches!(result, Err(RouteError::Startup(_))));
        assert_eq!(router.state(), ServerState::Stopped);
    }

    #[test]
    fn test_registration_after_start_fails() {
        let mut router = Router::new();
        router.route("GET", "/", [ok("root")]).unwrap();
        start(&mut router);
        assert_eq!(router.state(), ServerState::Starting);

        assert!(matches!(router.route("GET", "/late", [ok("late")]), Err(RouteError::Config(_))));
        assert!(matches!(router.attach(tag("late")), Err(RouteError::Config(_))));
        assert!(matches!(router.prefix("api"), Err(RouteError::Config(_))));
    }

    #[test]
    fn test_dispatch_before_start_fails() {
        let mut router = Router::new();
        router.route("GET", "/", [ok("root")]).unwrap();
        assert!(matches!(router.dispatch(HttpRequest::get("/")), Err(RouteError::Config(_))));
    }

    #[test]
    fn test_set_option_validation() {
        let mut router = Router::new();
        router.set_option(MAX_CACHE_ENTRIES, 16).unwrap();
        assert_eq!(router.max_cache_entries(), 16);
        router.set_option(MAX_CACHE_ENTRIES, 0).unwrap();
        assert_eq!(router.max_cache_entries(), 0);

        assert!(matches!(router.set_option(MAX_CACHE_ENTRIES, -1), Err(RouteError::Config(_))));
        assert!(matches!(router.set_option(MAX_CACHE_ENTRIES, "10"), Err(RouteError::Config(_))));
        assert!(matches!(router.set_option("cacheTtl", 10), Err(RouteError::Config(_))));
        assert_eq!(router.max_cache_entries(), 0);
    }

    #[test]
    fn test_start_publishes_allowed_methods() {
        let mut router = Router::new();
        router.route("get", "/a", [ok("a")]).unwrap();
        router.route("PURGE", "/a", [ok("purge")]).unwrap();

        let mut options = ServerOptions {
            allowed_methods: vec!["GET".into(), "HEAD".into()],
            normalize_method_case: true,
        };
        router.update(ServerState::Starting, &mut options).unwrap();
        assert_eq!(options.allowed_methods, vec!["GET", "HEAD", "PURGE"]);

        // The lower-case route answers GET because method case was normalized.
        assert_eq!(body(&router, "/a"), b"a");
    }
}
