//! Deferred responses.
//!
//! A [`ResponseBridge`] stands in for a response that a handler is still
//! computing. The transport drives it like any other [`Responder`]; calls that
//! arrive before the computation finishes are queued and replayed, in order
//! and exactly once, against the concrete response when it exists.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::router::action::{PendingResponse, RouteArgs};
use crate::router::error::RouteError;
use crate::server::{Error, HttpResponse, OutputEnv, Responder};

/// Translates the outcome of a pending computation into a concrete response.
pub trait DispatchContext: Send + Sync {
    /// Called with the computation's value. Returning an error routes it to
    /// [`respond_error`](DispatchContext::respond_error).
    fn respond(&self, args: &RouteArgs, response: Option<HttpResponse>) -> Result<Box<dyn Responder>, RouteError>;

    fn respond_error(&self, error: RouteError) -> Box<dyn Responder>;
}

enum Deferred {
    Prepare(OutputEnv),
    AssumeControl,
}

enum State {
    Pending(Vec<Deferred>),
    Resolved(Box<dyn Responder>),
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A [`Responder`] backed by a pending computation.
///
/// The computation and the resolver run as tasks on the current Tokio
/// runtime; creating a bridge outside one fails with [`RouteError::NoRuntime`].
pub struct ResponseBridge {
    state: Arc<Mutex<State>>,
    settled: watch::Receiver<bool>,
    work: AbortHandle,
}

impl ResponseBridge {
    pub fn new(
        context: Arc<dyn DispatchContext>,
        args: Arc<RouteArgs>,
        pending: PendingResponse,
    ) -> Result<Self, RouteError> {
        let runtime = Handle::try_current().map_err(|e| RouteError::NoRuntime(e.to_string()))?;
        let state = Arc::new(Mutex::new(State::Pending(Vec::new())));
        let (settled_tx, settled) = watch::channel(false);

        let work = runtime.spawn(pending);
        let abort = work.abort_handle();

        let resolver_state = Arc::clone(&state);
        runtime.spawn(async move {
            let outcome = match work.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => Err(RouteError::Cancelled),
                Err(e) => Err(RouteError::Handler(format!("pending response panicked: {e}"))),
            };
            let responder = match outcome.and_then(|response| context.respond(&args, response)) {
                Ok(responder) => responder,
                Err(e) => {
                    error!("Deferred response failed: {e}");
                    context.respond_error(e)
                }
            };
            resolve(&resolver_state, responder);
            let _ = settled_tx.send(true);
        });

        Ok(Self {
            state,
            settled,
            work: abort,
        })
    }

    /// Cancel the pending computation. The bridge still resolves, to an error response.
    pub fn abort(&self) {
        self.work.abort();
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*lock(&self.state), State::Resolved(_))
    }

    /// Wait until the concrete response exists and queued calls were replayed.
    pub async fn settled(&self) {
        let mut settled = self.settled.clone();
        // An Err means the resolver is gone; there is nothing left to wait for.
        let _ = settled.wait_for(|done| *done).await;
    }
}

// Replay happens under the lock, so a call racing with resolution either
// lands in the queue before it is drained or sees the resolved state.
fn resolve(state: &Mutex<State>, mut responder: Box<dyn Responder>) {
    let mut guard = lock(state);
    if let State::Pending(queue) = &mut *guard {
        let queue = std::mem::take(queue);
        debug!("Deferred response resolved, replaying {} call(s)", queue.len());
        for call in queue {
            match call {
                Deferred::Prepare(env) => responder.prepare(env),
                Deferred::AssumeControl => responder.assume_socket_control(),
            }
        }
    }
    *guard = State::Resolved(responder);
}

impl Responder for ResponseBridge {
    fn prepare(&mut self, env: OutputEnv) {
        match &mut *lock(&self.state) {
            State::Pending(queue) => queue.push(Deferred::Prepare(env)),
            State::Resolved(responder) => responder.prepare(env),
        }
    }

    fn assume_socket_control(&mut self) {
        match &mut *lock(&self.state) {
            State::Pending(queue) => queue.push(Deferred::AssumeControl),
            State::Resolved(responder) => responder.assume_socket_control(),
        }
    }

    fn write(&mut self) -> Result<bool, Error> {
        match &mut *lock(&self.state) {
            State::Pending(_) => Err(Error::Unresolved),
            State::Resolved(responder) => responder.write(),
        }
    }
}
