//! Per-connection session
//!
//! A [`Session`] owns one connection's stream pair and [`SessionState`]. It reads one
//! request at a time, answers it completely, and loops until the peer sends
//! `CLOSE`, disconnects, or the server is shutting down. A peer that stalls for longer
//! than the idle timeout, whether between requests or part way through a transfer,
//! is disconnected.
//!
//! Request handlers live in submodules, one per concern.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::catalog::SharedCatalog;
use crate::protocol::common::{ReceivingStream, SendReceivePair, SendingStream};
use crate::protocol::transfer::DEFAULT_CHUNK_SIZE;
use crate::protocol::{ProtocolError, Request};
use watchdog::{Interrupted, Watched};

mod auth;
mod download;
mod listing;
mod state;
pub use state::SessionState;
mod upload;
mod watchdog;


/// Tunables for a session
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// How long any read or write may wait without progress
    pub idle_timeout: Duration,
    /// Buffer size for file bodies
    pub chunk_size: usize,
    /// Where uploaded files are stored
    pub upload_dir: PathBuf,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(120),
            chunk_size: DEFAULT_CHUNK_SIZE,
            upload_dir: PathBuf::from("uploads"),
        }
    }
}

impl From<&crate::Configuration> for SessionOptions {
    fn from(config: &crate::Configuration) -> Self {
        Self {
            idle_timeout: Duration::from_secs(u64::from(config.idle_timeout)),
            chunk_size: config.chunk_size as usize,
            upload_dir: PathBuf::from(&config.upload_dir),
        }
    }
}

/// Why a session ended without a fault
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionEnd {
    /// The peer sent CLOSE
    Closed,
    /// The peer went away at a frame boundary
    Disconnected,
    /// The peer made no progress within the idle timeout
    IdleTimeout,
    /// The server is shutting down
    Shutdown,
}

/// Whether the request loop carries on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// One connection's request loop
#[derive(Debug)]
pub struct Session<S: SendingStream, R: ReceivingStream> {
    stream: SendReceivePair<Watched<S>, Watched<R>>,
    catalog: SharedCatalog,
    state: SessionState,
    options: SessionOptions,
}

impl<S: SendingStream, R: ReceivingStream> Session<S, R> {
    /// Constructor. The session begins unauthenticated.
    ///
    /// Once `shutdown` becomes true, any read or write in progress fails and the session ends.
    pub fn new(
        stream: SendReceivePair<S, R>,
        catalog: SharedCatalog,
        options: SessionOptions,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let idle = options.idle_timeout;
        let stream = SendReceivePair {
            send: Watched::new(stream.send, idle, shutdown.clone()),
            recv: Watched::new(stream.recv, idle, shutdown),
        };
        Self {
            stream,
            catalog,
            state: SessionState::default(),
            options,
        }
    }

    /// Runs requests until the session ends.
    ///
    /// The stream pair is handed back so the caller can close it, whatever the outcome.
    pub async fn run(mut self) -> (SendReceivePair<S, R>, Result<SessionEnd, ProtocolError>) {
        let result = match self.run_inner().await {
            Err(e) => self.interrupted(e),
            ok => ok,
        };
        let stream = SendReceivePair {
            send: self.stream.send.into_inner(),
            recv: self.stream.recv.into_inner(),
        };
        (stream, result)
    }

    /// Sorts the stream interruptions (stall, shutdown) out from genuine faults
    fn interrupted(&self, e: ProtocolError) -> Result<SessionEnd, ProtocolError> {
        let ProtocolError::Transport(io) = &e else {
            return Err(e);
        };
        match Interrupted::from_io(io) {
            Some(Interrupted::Idle) => {
                info!("no activity for {:?}; closing", self.options.idle_timeout);
                Ok(SessionEnd::IdleTimeout)
            }
            Some(Interrupted::Shutdown) => Ok(SessionEnd::Shutdown),
            None => Err(e),
        }
    }

    async fn run_inner(&mut self) -> Result<SessionEnd, ProtocolError> {
        loop {
            let request = match Request::read_from(&mut self.stream.recv).await {
                Err(e) if e.is_disconnect() => {
                    debug!("peer disconnected");
                    return Ok(SessionEnd::Disconnected);
                }
                r => r?,
            };
            trace!("{} request", request.tag());
            if self.dispatch(request).await? == Flow::Close {
                debug!("peer closed the session");
                return Ok(SessionEnd::Closed);
            }
            self.stream.flush().await?;
        }
    }

    async fn dispatch(&mut self, request: Request) -> Result<Flow, ProtocolError> {
        match request {
            Request::Echo(data) => self.handle_echo(data).await?,
            Request::List => self.handle_list().await?,
            Request::User(name) => self.handle_user(&name),
            Request::Pass(secret) => self.handle_pass(secret).await?,
            Request::File(id) => self.handle_file(id).await?,
            Request::Random => self.handle_random().await?,
            Request::Upload => self.handle_upload().await?,
            Request::Close => return Ok(Flow::Close),
        }
        Ok(Flow::Continue)
    }

    /// Current authentication state
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }
}

/// Resolves once shutdown has been signalled. Never resolves if the sender has gone away.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let signalled = rx.wait_for(|stop| *stop).await.is_ok();
    if !signalled {
        std::future::pending::<()>().await;
    }
}
