//! A routing server showing placeholders, filters, redirects, sub-routers and deferred responses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::info;
use routehttp_rs::router::{Action, Filter, Monitor, Reply, RouteArgs};
use routehttp_rs::{HttpRequest, HttpResponse, HttpServer, RouteError, Router, ServerConfig, StatusCode};

/// Counts responses and reports the count as a monitor.
#[derive(Default)]
struct RequestCounter {
    served: AtomicU64,
}

impl Filter for RequestCounter {
    fn filter(&self, _req: &HttpRequest, response: HttpResponse, _args: &RouteArgs) -> HttpResponse {
        let n = self.served.fetch_add(1, Ordering::Relaxed) + 1;
        response.with_header("X-Request-Count", n.to_string())
    }
}

impl Monitor for RequestCounter {
    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({ "served": self.served.load(Ordering::Relaxed) })
    }

    fn kind(&self) -> &'static str {
        "requests"
    }
}

fn api() -> Result<Router, RouteError> {
    let mut api = Router::new();
    api.route("GET", "/users/{id}/?", [Action::from_fn(|_req, args| {
        let body = serde_json::json!({ "id": args.get("id") });
        let response = HttpResponse::new(StatusCode::Ok)
            .with_json(&body)
            .map_err(|e| RouteError::Handler(e.to_string()))?;
        Ok(Reply::from(response))
    })])?;
    api.route("GET", "/slow", [Action::from_fn(|_req, _args| {
        Ok(Reply::pending(async {
            tokio::time::sleep(Duration::from_millis(250)).await;
            Ok::<_, RouteError>(Some(
                HttpResponse::new(StatusCode::Ok)
                    .with_content_type("text/plain")
                    .with_body_string("worth the wait"),
            ))
        }))
    })])?;
    api.prefix("api")?;
    Ok(api)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = ServerConfig {
        addr: "127.0.0.1:8081".parse()?,
        ..ServerConfig::default()
    };

    let counter = Arc::new(RequestCounter::default());
    let mut router = Router::new();
    router.attach(Action::new().with_filter(counter.clone()).with_monitor(counter))?;
    router.route("GET", "/", [Action::from_fn(|_req, _args| {
        Ok(Reply::from(
            HttpResponse::new(StatusCode::Ok)
                .with_content_type("text/plain")
                .with_body_string("Hello, World!"),
        ))
    })])?;
    router.route("GET", "/hello", [Action::from_fn(|req, _args| {
        let name = req.get_query_param("name").map_or("World", |s| s.as_str());
        Ok(Reply::from(
            HttpResponse::new(StatusCode::Ok)
                .with_content_type("text/plain")
                .with_body_string(format!("Hello, {name}!")),
        ))
    })])?;
    router.attach(api()?)?;

    let server = HttpServer::new(config, router);
    let monitor = server.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(30)).await;
            let report = monitor.router().read().await.monitor();
            info!("Monitors: {}", serde_json::to_string(&report).unwrap_or_default());
        }
    });

    server.start().await?;
    Ok(())
}
