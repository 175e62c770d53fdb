//! One-shot client for a node socket.
//!
//! The host side of the contract: connect, send one framed request, read one
//! framed response, close. Used by the orchestrator and by integration tests;
//! there is no connection reuse to manage.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::codec;
use crate::proto::{Request, Response};
use crate::value::Value;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct NodeClient {
    socket_path: PathBuf,
}

impl NodeClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.socket_path
    }

    /// Send one request to the node and return its response.
    pub async fn call(&self, method: &str, id: &str, params: Value) -> io::Result<Response> {
        let stream = tokio::time::timeout(
            CONNECT_TIMEOUT,
            UnixStream::connect(&self.socket_path),
        )
        .await
        .map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connection timed out: {}", self.socket_path.display()),
            )
        })?
        .map_err(|e| {
            io::Error::new(
                e.kind(),
                format!(
                    "{e} (is the node running? expected socket at {})",
                    self.socket_path.display()
                ),
            )
        })?;

        let mut framed = Framed::new(stream, codec::frame_codec());

        let request = Request::new(method, id, params);
        debug!(method, "sending request to node");
        let payload = codec::encode(&request.to_value()).map_err(io::Error::other)?;
        framed.send(Bytes::from(payload)).await?;

        let Some(frame) = framed.next().await else {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "node closed the connection without a response",
            ));
        };
        let frame = frame?;

        let envelope = codec::decode(&frame)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Response::from_value(&envelope)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
