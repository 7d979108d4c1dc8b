//! Turns a route's action list into a callable chain.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::parser::HttpRequest;
use crate::router::action::{Action, ActionId, Filter, Handler, Monitor, Reply, RouteArgs};
use crate::router::error::RouteError;
use crate::router::lifecycle::ServerOptions;
use crate::server::HttpResponse;

/// A route ready to serve: one handler chain, its filters and its monitors.
pub struct CompiledRoute {
    chain: Arc<dyn Handler>,
    filters: Vec<Arc<dyn Filter>>,
    monitors: BTreeMap<&'static str, Vec<Arc<dyn Monitor>>>,
}

impl CompiledRoute {
    /// Run the handler chain.
    pub fn call(&self, request: &Arc<HttpRequest>, args: &Arc<RouteArgs>) -> Result<Reply, RouteError> {
        self.chain.call(request, args)
    }

    /// Run every filter in declaration order.
    pub fn apply_filters(&self, request: &HttpRequest, response: HttpResponse, args: &RouteArgs) -> HttpResponse {
        self.filters
            .iter()
            .fold(response, |response, filter| filter.filter(request, response, args))
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    /// Monitors grouped by [`Monitor::kind`].
    pub fn monitors(&self) -> &BTreeMap<&'static str, Vec<Arc<dyn Monitor>>> {
        &self.monitors
    }
}

impl fmt::Debug for CompiledRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRoute")
            .field("filters", &self.filters.len())
            .field("monitors", &self.monitors.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Clone)]
struct Booted {
    handler: Option<Arc<dyn Handler>>,
    filter: Option<Arc<dyn Filter>>,
}

/// One compilation pass over every route of a router.
///
/// Bootables are booted at most once per pass, keyed by [`ActionId`].
pub(crate) struct Compiler<'a> {
    options: &'a ServerOptions,
    booted: HashMap<ActionId, Booted>,
}

impl<'a> Compiler<'a> {
    pub(crate) fn new(options: &'a ServerOptions) -> Self {
        Self {
            options,
            booted: HashMap::new(),
        }
    }

    pub(crate) fn compile(&mut self, actions: &[Action]) -> Result<CompiledRoute, RouteError> {
        let mut handlers: Vec<Arc<dyn Handler>> = Vec::new();
        let mut filters: Vec<Arc<dyn Filter>> = Vec::new();
        let mut monitors: BTreeMap<&'static str, Vec<Arc<dyn Monitor>>> = BTreeMap::new();
        let mut seen_monitors: HashSet<ActionId> = HashSet::new();

        for action in actions {
            if let Some(monitor) = action.monitor() {
                if seen_monitors.insert(action.id()) {
                    monitors.entry(monitor.kind()).or_default().push(Arc::clone(monitor));
                }
            }

            let roles = match action.bootable() {
                Some(_) => self.boot(action)?,
                None => Booted {
                    handler: action.handler().cloned(),
                    filter: action.filter().cloned(),
                },
            };
            handlers.extend(roles.handler);
            filters.extend(roles.filter);
        }

        Ok(CompiledRoute {
            chain: compose(handlers),
            filters,
            monitors,
        })
    }

    fn boot(&mut self, action: &Action) -> Result<Booted, RouteError> {
        if let Some(booted) = self.booted.get(&action.id()) {
            return Ok(booted.clone());
        }
        let Some(bootable) = action.bootable() else {
            return Err(RouteError::Internal("boot called on a non-bootable action".to_string()));
        };

        debug!("Booting {}", bootable.name());
        let booted = match bootable.boot(self.options)? {
            None => Booted {
                handler: action.handler().cloned(),
                filter: action.filter().cloned(),
            },
            Some(replacement) if replacement.handler().is_some() || replacement.filter().is_some() => Booted {
                handler: replacement.handler().cloned(),
                filter: replacement.filter().cloned(),
            },
            Some(_) => {
                return Err(RouteError::BootFailed {
                    name: bootable.name().to_string(),
                })
            }
        };
        self.booted.insert(action.id(), booted.clone());
        Ok(booted)
    }
}

fn compose(mut handlers: Vec<Arc<dyn Handler>>) -> Arc<dyn Handler> {
    match handlers.len() {
        0 => Arc::new(Declines),
        1 => handlers.remove(0),
        _ => Arc::new(Fallthrough {
            handlers: handlers.into(),
        }),
    }
}

/// Chain of a route without handlers; filter-only routes use it.
struct Declines;

impl Handler for Declines {
    fn call(&self, _request: &Arc<HttpRequest>, _args: &Arc<RouteArgs>) -> Result<Reply, RouteError> {
        Ok(Reply::Empty)
    }
}

/// Tries each handler in turn until one replies.
struct Fallthrough {
    handlers: Arc<[Arc<dyn Handler>]>,
}

impl Handler for Fallthrough {
    fn call(&self, request: &Arc<HttpRequest>, args: &Arc<RouteArgs>) -> Result<Reply, RouteError> {
        fall_through(Arc::clone(&self.handlers), 0, request, args)
    }
}

// A pending reply at `index` carries the rest of the chain with it: when it
// resolves empty, the walk resumes at `index + 1` inside the same future.
fn fall_through(
    handlers: Arc<[Arc<dyn Handler>]>,
    start: usize,
    request: &Arc<HttpRequest>,
    args: &Arc<RouteArgs>,
) -> Result<Reply, RouteError> {
    for (index, handler) in handlers.iter().enumerate().skip(start) {
        match handler.call(request, args)? {
            Reply::Empty => continue,
            Reply::Pending(pending) => {
                let handlers = Arc::clone(&handlers);
                let request = Arc::clone(request);
                let args = Arc::clone(args);
                return Ok(Reply::pending(async move {
                    match pending.await? {
                        Some(response) => Ok(Some(response)),
                        None => fall_through(handlers, index + 1, &request, &args)?.settle().await,
                    }
                }));
            }
            ready => return Ok(ready),
        }
    }
    Err(RouteError::NoResponse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use crate::router::action::Bootable;
    use crate::server::StatusCode;

    fn request() -> Arc<HttpRequest> {
        Arc::new(HttpRequest::get("/"))
    }

    fn args() -> Arc<RouteArgs> {
        Arc::new(RouteArgs::new())
    }

    fn respond(status: StatusCode) -> Action {
        Action::from_fn(move |_req, _args| Ok(Reply::Ready(HttpResponse::new(status))))
    }

    fn decline(log: Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Action {
        Action::from_fn(move |_req, _args| {
            log.lock().unwrap().push(name);
            Ok(Reply::Empty)
        })
    }

    fn compile(actions: &[Action]) -> Result<CompiledRoute, RouteError> {
        let options = ServerOptions::default();
        Compiler::new(&options).compile(actions)
    }

    struct Fixed;

    impl Handler for Fixed {
        fn call(&self, _request: &Arc<HttpRequest>, _args: &Arc<RouteArgs>) -> Result<Reply, RouteError> {
            Ok(Reply::Ready(HttpResponse::new(StatusCode::Ok)))
        }
    }

    fn respond_ok() -> Action {
        respond(StatusCode::Ok)
    }

    fn monitor_only() -> Action {
        Action::from_monitor(Gauge(0))
    }

    #[test]
    fn test_single_handler_is_used_directly() {
        let route = compile(&[respond(StatusCode::Created)]).unwrap();
        match route.call(&request(), &args()).unwrap() {
            Reply::Ready(response) => assert_eq!(response.status, StatusCode::Created),
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn test_filter_only_route_declines() {
        let route = compile(&[Action::filter_fn(|_req, resp, _args| resp)]).unwrap();
        assert!(matches!(route.call(&request(), &args()).unwrap(), Reply::Empty));
        assert_eq!(route.filter_count(), 1);
    }

    #[test]
    fn test_fallthrough_stops_at_first_response() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let route = compile(&[
            decline(log.clone(), "first"),
            respond(StatusCode::Accepted),
            decline(log.clone(), "never"),
        ])
        .unwrap();

        let reply = route.call(&request(), &args()).unwrap();
        assert!(matches!(reply, Reply::Ready(ref r) if r.status == StatusCode::Accepted));
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
    }

    #[test]
    fn test_fallthrough_without_response_fails() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let route = compile(&[decline(log.clone(), "a"), decline(log.clone(), "b")]).unwrap();
        assert!(matches!(route.call(&request(), &args()), Err(RouteError::NoResponse)));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_pending_decline_resumes_at_next_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pending_log = log.clone();
        let route = compile(&[
            Action::from_fn(move |_req, _args| {
                let log = pending_log.clone();
                Ok(Reply::pending(async move {
                    log.lock().unwrap().push("pending");
                    Ok::<Option<HttpResponse>, RouteError>(None)
                }))
            }),
            decline(log.clone(), "second"),
            respond(StatusCode::NoContent),
        ])
        .unwrap();

        let reply = route.call(&request(), &args()).unwrap();
        assert!(matches!(reply, Reply::Pending(_)));
        assert!(log.lock().unwrap().is_empty());

        let response = reply.settle().await.unwrap().unwrap();
        assert_eq!(response.status, StatusCode::NoContent);
        assert_eq!(*log.lock().unwrap(), vec!["pending", "second"]);
    }

    #[tokio::test]
    async fn test_pending_chain_without_response_fails() {
        let route = compile(&[
            Action::from_fn(|_req, _args| Ok(Reply::pending(async { Ok::<Option<HttpResponse>, RouteError>(None) }))),
            Action::from_fn(|_req, _args| Ok(Reply::Empty)),
        ])
        .unwrap();
        let reply = route.call(&request(), &args()).unwrap();
        assert!(matches!(reply.settle().await, Err(RouteError::NoResponse)));
    }

    #[test]
    fn test_filters_run_in_declaration_order() {
        let route = compile(&[
            respond(StatusCode::Ok),
            Action::filter_fn(|_req, resp, _args| resp.with_header("X-Order", "first")),
            Action::filter_fn(|_req, resp, _args| {
                let seen = resp.header("X-Order").unwrap_or_default().to_string();
                resp.with_header("X-Order", format!("{seen},second"))
            }),
        ])
        .unwrap();
        let response = route.apply_filters(&HttpRequest::get("/"), HttpResponse::new(StatusCode::Ok), &RouteArgs::new());
        assert_eq!(response.header("X-Order"), Some("first,second"));
    }

    struct CountingBoot {
        boots: Arc<AtomicUsize>,
        replacement: Option<fn() -> Action>,
    }

    impl Bootable for CountingBoot {
        fn boot(&self, _options: &ServerOptions) -> Result<Option<Action>, RouteError> {
            self.boots.fetch_add(1, Ordering::SeqCst);
            Ok(self.replacement.map(|make| make()))
        }

        fn name(&self) -> &str {
            "CountingBoot"
        }
    }

    #[test]
    fn test_bootable_boots_once_per_pass() {
        let boots = Arc::new(AtomicUsize::new(0));
        let shared = Action::from_bootable(CountingBoot {
            boots: boots.clone(),
            replacement: Some(respond_ok as fn() -> Action),
        });

        let options = ServerOptions::default();
        let mut compiler = Compiler::new(&options);
        let first = compiler.compile(&[shared.clone()]).unwrap();
        let second = compiler.compile(&[shared.clone(), shared]).unwrap();
        assert_eq!(boots.load(Ordering::SeqCst), 1);

        assert!(matches!(first.call(&request(), &args()).unwrap(), Reply::Ready(_)));
        // Booted twice on the same route: two handlers, the first one answers.
        assert!(matches!(second.call(&request(), &args()).unwrap(), Reply::Ready(_)));

        // A new pass boots again.
        Compiler::new(&options).compile(&[Action::from_bootable(CountingBoot {
            boots: boots.clone(),
            replacement: Some(respond_ok as fn() -> Action),
        })]).unwrap();
        assert_eq!(boots.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_bootable_without_result_keeps_own_roles() {
        let boots = Arc::new(AtomicUsize::new(0));
        let bootable = Arc::new(CountingBoot { boots: boots.clone(), replacement: None });
        let action = Action::new().with_bootable(bootable).with_handler(Arc::new(Fixed));

        let route = compile(&[action]).unwrap();
        assert_eq!(boots.load(Ordering::SeqCst), 1);
        assert!(matches!(route.call(&request(), &args()).unwrap(), Reply::Ready(_)));
    }

    #[test]
    fn test_bootable_with_unusable_result_names_the_bootable() {
        let action = Action::from_bootable(CountingBoot {
            boots: Arc::new(AtomicUsize::new(0)),
            replacement: Some(monitor_only as fn() -> Action),
        });
        match compile(&[action]) {
            Err(RouteError::BootFailed { name }) => assert_eq!(name, "CountingBoot"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    struct Gauge(u32);

    impl Monitor for Gauge {
        fn snapshot(&self) -> serde_json::Value {
            serde_json::json!(self.0)
        }
    }

    #[test]
    fn test_monitors_grouped_by_kind_and_deduplicated() {
        let gauge = Action::from_monitor(Gauge(1));
        let route = compile(&[gauge.clone(), gauge, Action::from_monitor(Gauge(2)), respond(StatusCode::Ok)]).unwrap();
        let monitors = route.monitors();
        assert_eq!(monitors.len(), 1);
        let gauges = monitors.values().next().unwrap();
        let snapshots: Vec<_> = gauges.iter().map(|m| m.snapshot()).collect();
        assert_eq!(snapshots, vec![serde_json::json!(1), serde_json::json!(2)]);
    }
}
