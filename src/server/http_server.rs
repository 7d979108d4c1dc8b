//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tokio::signal;
use log::{debug, info, warn, error};

use crate::parser::{HttpVersion, Method, parse_request};
use crate::router::{Router, ServerOptions, ServerState, MAX_CACHE_ENTRIES};
use crate::server::config::ServerConfig;
use crate::server::error::Error;
use crate::server::output::{OutputEnv, OutputSink, Responder};
use crate::server::response::{HttpResponse, StatusCode};

struct Shared {
    config: ServerConfig,
    router: RwLock<Router>,
    options: RwLock<ServerOptions>,
}

/// An HTTP server that answers requests through a [`Router`].
///
/// Cloning is cheap; clones share the router and options.
#[derive(Clone)]
pub struct HttpServer {
    shared: Arc<Shared>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and routes.
    pub fn new(config: ServerConfig, router: Router) -> Self {
        let options = ServerOptions::from_config(&config);
        Self {
            shared: Arc::new(Shared {
                config,
                router: RwLock::new(router),
                options: RwLock::new(options),
            }),
        }
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// The router. Take the write lock to register routes before [`boot`](Self::boot).
    pub fn router(&self) -> &RwLock<Router> {
        &self.shared.router
    }

    /// A copy of the current server options.
    pub async fn options(&self) -> ServerOptions {
        self.shared.options.read().await.clone()
    }

    /// Walk the router through startup: compile routes and publish methods.
    ///
    /// Does nothing when the router is already running.
    pub async fn boot(&self) -> Result<(), Error> {
        let mut router = self.shared.router.write().await;
        if router.state() != ServerState::Stopped {
            debug!("Router already booted ({:?})", router.state());
            return Ok(());
        }
        let mut options = self.shared.options.write().await;

        router.set_option(MAX_CACHE_ENTRIES, self.shared.config.max_cache_entries)?;
        router.update(ServerState::Starting, &mut options)?;
        router.update(ServerState::Started, &mut options)?;
        info!("Allowed methods: {}", options.allowed_methods.join(", "));
        Ok(())
    }

    async fn halt(&self) {
        let mut router = self.shared.router.write().await;
        let mut options = self.shared.options.write().await;
        for state in [ServerState::Stopping, ServerState::Stopped] {
            if let Err(e) = router.update(state, &mut options) {
                warn!("Router rejected {state:?}: {e}");
            }
        }
    }

    /// Set up the TCP listener.
    async fn setup_listener(&self) -> Result<TcpListener, Error> {
        let listener = TcpListener::bind(&self.shared.config.addr).await?;
        info!(
            "{name} listening on http://{addr}",
            name = self.shared.config.server_name,
            addr = self.shared.config.addr
        );
        Ok(listener)
    }

    /// Resolves on Ctrl+C. Never resolves if the handler cannot be installed.
    async fn ctrl_c() {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
            Err(e) => {
                error!("Error setting up Ctrl+C handler: {e}");
                std::future::pending::<()>().await
            }
        }
    }

    /// Handle a new connection.
    async fn handle_new_connection(
        &self,
        mut socket: tokio::net::TcpStream,
        addr: SocketAddr,
        semaphore: Arc<tokio::sync::Semaphore>,
        shutdown_tx: Arc<mpsc::Sender<()>>,
        tasks: &mut JoinSet<()>,
    ) {
        let permit = match semaphore.try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Connection limit reached, rejecting connection from {addr}");
                let response = HttpResponse::new(StatusCode::ServiceUnavailable)
                    .with_content_type("text/plain")
                    .with_body_string("Server is at capacity, please try again later");
                let _ = socket.write_all(&response.to_bytes()).await;
                return;
            }
        };

        let server = self.clone();
        tasks.spawn(async move {
            // The permit is dropped when the task completes, releasing the semaphore slot
            let _permit = permit;

            if let Err(e) = server.handle_connection(&mut socket).await {
                error!("Error handling connection from {addr}: {e}");

                if matches!(e, Error::IoError(_)) {
                    info!("Critical I/O error, initiating shutdown");
                    let _ = shutdown_tx.send(()).await;
                }
            }
        });
    }

    /// Handle connection errors.
    async fn handle_connection_error(e: std::io::Error) -> bool {
        error!("Error accepting connection: {e}");

        if e.kind() == std::io::ErrorKind::BrokenPipe {
            error!("Critical error accepting connection, shutting down");
            return true;
        }

        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        false
    }

    /// Perform graceful shutdown.
    async fn perform_shutdown(tasks: &mut JoinSet<()>) {
        info!("Waiting for {len} active connections to complete...", len = tasks.len());
        let shutdown_timeout = tokio::time::Duration::from_secs(30);
        let _ = tokio::time::timeout(shutdown_timeout, async {
            while let Some(res) = tasks.join_next().await {
                if let Err(e) = res {
                    error!("Task failed during shutdown: {e}");
                }
            }
        }).await;

        info!("Server shutdown complete");
    }

    /// Boot the router, then listen for incoming connections until Ctrl+C.
    pub async fn start(&self) -> Result<(), Error> {
        self.boot().await?;
        let listener = self.setup_listener().await?;
        self.serve(listener, Self::ctrl_c()).await
    }

    /// Accept connections on `listener` until `shutdown` completes.
    ///
    /// Boots the router first if needed. On shutdown, waits for in-flight
    /// connections and walks the router back to `Stopped`.
    pub async fn serve(&self, listener: TcpListener, shutdown: impl Future<Output = ()>) -> Result<(), Error> {
        self.boot().await?;
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.shared.config.max_connections));

        // Connection tasks report critical I/O errors here.
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let shutdown_tx = Arc::new(shutdown_tx);

        let mut tasks = JoinSet::new();
        let mut shutdown = pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down server...");
                    break;
                }

                _ = shutdown_rx.recv() => {
                    info!("Shutting down server after a critical error...");
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((socket, addr)) => {
                            self.handle_new_connection(
                                socket,
                                addr,
                                semaphore.clone(),
                                shutdown_tx.clone(),
                                &mut tasks
                            ).await;
                        },
                        Err(e) => {
                            if Self::handle_connection_error(e).await {
                                break;
                            }
                        }
                    }
                }
            }
        }

        Self::perform_shutdown(&mut tasks).await;
        self.halt().await;

        Ok(())
    }

    /// Handle a single connection: read one request, route it and write the response.
    ///
    /// The router must have been booted. Requests nothing answers get a 404.
    pub async fn handle_connection(&self, socket: &mut (impl AsyncRead + AsyncWrite + Unpin)) -> Result<(), Error> {
        let mut buf = vec![0; self.shared.config.read_buffer_size];

        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(()); // Connection closed
        }

        let request = match parse_request(&buf[..n]) {
            Ok(req) => req,
            Err(e) => {
                let response = HttpResponse::new(StatusCode::BadRequest)
                    .with_content_type("text/plain")
                    .with_body_string(format!("Error parsing request: {e}"));
                socket.write_all(&response.to_bytes()).await?;
                return Err(Error::ParseError(e));
            }
        };

        let version = request.version;
        let head_only = request.method == Method::HEAD;

        let allowed = {
            let options = self.shared.options.read().await;
            if options.is_allowed(request.method.as_str()) {
                None
            } else {
                Some(options.allowed_methods.join(", "))
            }
        };
        if let Some(allowed) = allowed {
            debug!("Rejecting {} {}, server accepts {allowed}", request.method, request.path);
            let response = HttpResponse::generic(StatusCode::MethodNotAllowed).with_header("Allow", allowed);
            return self.send(socket, response, version, head_only).await;
        }

        let path = request.path.clone();
        let routed = self.shared.router.read().await.dispatch(request);
        match routed {
            Ok(Some(response)) => self.send(socket, response, version, head_only).await,
            Ok(None) => {
                debug!("No route answered {path}");
                self.send(socket, HttpResponse::generic(StatusCode::NotFound), version, head_only).await
            }
            Err(e) => {
                error!("Routing {path} failed: {e}");
                let response = HttpResponse::generic(StatusCode::InternalServerError);
                self.send(socket, response, version, head_only).await?;
                Err(Error::Route(e))
            }
        }
    }

    /// Drive `response` through the output protocol and copy its bytes to the socket.
    async fn send(
        &self,
        socket: &mut (impl AsyncWrite + Unpin),
        mut response: impl Responder,
        version: HttpVersion,
        head_only: bool,
    ) -> Result<(), Error> {
        let (sink, mut rx) = OutputSink::channel();
        response.prepare(OutputEnv {
            version,
            head_only,
            server_name: self.shared.config.server_name.clone(),
            sink,
        });
        response.assume_socket_control();
        // A deferred response keeps writing from its own task after this.
        drop(response);

        while let Some(chunk) = rx.recv().await {
            socket.write_all(&chunk).await?;
        }
        socket.flush().await?;
        Ok(())
    }
}
