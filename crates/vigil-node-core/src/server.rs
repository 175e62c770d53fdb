//! Per-node socket server.
//!
//! One listener bound to a filesystem path, one dedicated accept-loop task,
//! one task per accepted connection. Every connection carries exactly one
//! request frame and at most one response frame, then closes; there is no
//! connection reuse. A stalled client can only stall its own connection
//! task — the accept loop and every other connection keep running.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::Framed;
use tracing::{info, warn};

use crate::codec;
use crate::dispatch::{Dispatcher, ServerControl};
use crate::node::NodeCapability;
use crate::socket;

/// Bound on concurrently served connections.
const MAX_CONNECTIONS: usize = 32;

/// A client that delivers no complete request frame within this window is
/// dropped. The original transport had no timeout at all; this is a
/// deliberate hardening addition.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// NodeServer
// ---------------------------------------------------------------------------

pub struct NodeServer {
    path: PathBuf,
    dispatcher: Arc<Dispatcher>,
    control: ServerControl,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl NodeServer {
    pub fn new(path: impl Into<PathBuf>, capability: Arc<dyn NodeCapability>) -> Self {
        let control = ServerControl::new();
        let dispatcher = Arc::new(Dispatcher::new(capability, control.clone()));
        Self {
            path: path.into(),
            dispatcher,
            control,
            accept_task: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Handle for signalling a stop from outside the server (signal
    /// handlers, tests).
    pub fn control(&self) -> ServerControl {
        self.control.clone()
    }

    fn is_running(&self) -> bool {
        self.accept_task
            .lock()
            .expect("accept task mutex poisoned")
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Bind the socket and spawn the accept loop.
    ///
    /// Calling `start` on an already-running server is a no-op success. A
    /// stale socket file left by a dead process is unlinked before binding;
    /// a socket file with a live listener behind it is `AddrInUse`.
    pub async fn start(&self) -> io::Result<()> {
        if self.is_running() {
            return Ok(());
        }

        socket::ensure_parent_dir(&self.path)?;

        if self.path.exists() {
            match UnixStream::connect(&self.path).await {
                Ok(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AddrInUse,
                        format!("socket already in use: {}", self.path.display()),
                    ));
                }
                Err(_) => {
                    // Stale socket file.
                    tokio::fs::remove_file(&self.path).await?;
                }
            }
        }

        let listener = UnixListener::bind(&self.path)?;
        self.control.reset();
        let shutdown_rx = self.control.subscribe();

        let handle = tokio::spawn(accept_loop(
            listener,
            self.path.clone(),
            self.dispatcher.clone(),
            shutdown_rx,
        ));

        *self
            .accept_task
            .lock()
            .expect("accept task mutex poisoned") = Some(handle);
        Ok(())
    }

    /// Signal the accept loop to stop and wait for it to drain.
    ///
    /// In-flight connections are joined before the socket file is removed.
    /// Safe to call more than once; safe to race with a shutdown RPC.
    pub async fn stop(&self) {
        self.control.signal_stop();
        self.join().await;
    }

    /// Wait until the accept loop finishes, however the stop was triggered
    /// (direct [`stop`](Self::stop), shutdown RPC, or signal handler).
    pub async fn join(&self) {
        let handle = self
            .accept_task
            .lock()
            .expect("accept task mutex poisoned")
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("accept loop task failed: {e}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Accept loop and connection handling
// ---------------------------------------------------------------------------

async fn accept_loop(
    listener: UnixListener,
    path: PathBuf,
    dispatcher: Arc<Dispatcher>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let _socket_guard = SocketGuard::new(path.clone());
    let limiter = Arc::new(Semaphore::new(MAX_CONNECTIONS));
    let mut connections = JoinSet::new();

    info!("listening on {}", path.display());

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            res = listener.accept() => {
                match res {
                    Ok((stream, _addr)) => {
                        let permit = match limiter.clone().try_acquire_owned() {
                            Ok(p) => p,
                            Err(_) => {
                                warn!("connection limit reached ({MAX_CONNECTIONS}), dropping");
                                drop(stream);
                                continue;
                            }
                        };
                        let dispatcher = dispatcher.clone();
                        connections.spawn(async move {
                            let _permit = permit;
                            handle_conn(dispatcher, stream).await;
                        });
                    }
                    Err(e) => warn!("accept failed: {e}"),
                }
            }
            // Reap finished connection tasks as we go.
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    // Stop accepting before draining in-flight work.
    drop(listener);
    while connections.join_next().await.is_some() {}

    info!("stopped listening on {}", path.display());
    // The guard unlinks the socket file on drop.
}

/// Serve one connection: one request frame in, one response frame out.
///
/// A framing fault or a timed-out read closes the connection without a
/// response; everything past a complete frame is answered.
async fn handle_conn(dispatcher: Arc<Dispatcher>, stream: UnixStream) {
    let mut framed = Framed::new(stream, codec::frame_codec());

    let frame = match tokio::time::timeout(READ_TIMEOUT, framed.next()).await {
        Ok(Some(Ok(frame))) => frame,
        Ok(Some(Err(e))) => {
            warn!("bad frame from client: {e}");
            return;
        }
        Ok(None) => {
            // Peer closed before a full frame arrived.
            return;
        }
        Err(_) => {
            warn!("client sent no complete frame within {READ_TIMEOUT:?}");
            return;
        }
    };

    let response = dispatcher.dispatch_payload(&frame).await;

    let payload = match codec::encode(&response.to_value()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("failed to encode response: {e}");
            return;
        }
    };
    if let Err(e) = framed.send(Bytes::from(payload)).await {
        warn!("failed to write response frame: {e}");
    }
}

// ---------------------------------------------------------------------------
// Socket file guard
// ---------------------------------------------------------------------------

struct SocketGuard {
    path: PathBuf,
}

impl SocketGuard {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
