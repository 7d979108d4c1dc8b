//! The output protocol between routed responses and the transport.
//!
//! The transport calls [`Responder::prepare`] once, then
//! [`Responder::assume_socket_control`], after which the responder owns the
//! connection's output and pushes bytes into the environment's sink. The sink
//! closes when every clone of it has been dropped, which is how the transport
//! learns that the response is complete.

use log::warn;
use tokio::sync::mpsc;

use crate::parser::HttpVersion;
use crate::server::error::Error;
use crate::server::response::HttpResponse;

/// Anything the transport can drive to produce response bytes.
pub trait Responder: Send {
    /// Bind the response to the connection it will be written to.
    fn prepare(&mut self, env: OutputEnv);

    /// Hand the connection's output over to the response.
    fn assume_socket_control(&mut self);

    /// Push pending output into the sink.
    ///
    /// Returns `Ok(true)` once the whole response has been emitted.
    fn write(&mut self) -> Result<bool, Error>;
}

/// Write end of a connection's output channel.
#[derive(Debug, Clone)]
pub struct OutputSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl OutputSink {
    /// Create a sink and the receiver the transport drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a chunk for the connection.
    pub fn send(&self, chunk: Vec<u8>) -> Result<(), Error> {
        self.tx.send(chunk).map_err(|_| Error::ConnectionClosed)
    }
}

/// What a response needs to know about the connection before writing.
#[derive(Debug, Clone)]
pub struct OutputEnv {
    /// Version of the request; echoed on the status line.
    pub version: HttpVersion,
    /// HEAD requests get headers only.
    pub head_only: bool,
    /// Value for the `Server` header when the response does not set one.
    pub server_name: String,
    /// Where the bytes go.
    pub sink: OutputSink,
}

impl Responder for HttpResponse {
    fn prepare(&mut self, env: OutputEnv) {
        if self.header("Server").is_none() {
            self.headers.insert("Server".to_string(), env.server_name.clone());
        }
        if self.header("Content-Length").is_none() {
            self.headers.insert("Content-Length".to_string(), self.body.len().to_string());
        }
        self.output = Some(env);
    }

    fn assume_socket_control(&mut self) {
        if let Err(e) = self.write() {
            warn!("Response could not be written: {e}");
        }
    }

    fn write(&mut self) -> Result<bool, Error> {
        if self.written {
            return Ok(true);
        }
        // Taking the environment drops our sink clone once the bytes are queued.
        let env = self.output.take().ok_or(Error::NotPrepared)?;
        env.sink.send(self.serialize(env.version, !env.head_only))?;
        self.written = true;
        Ok(true)
    }
}
