pub mod command_path;
pub mod subprocess;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

pub use subprocess::SubprocessTransport;

/// A clonable handle for writing JSON-RPC messages to a transport.
///
/// Shared between the client's request path and its router task, which
/// answers server-initiated requests.
#[derive(Clone)]
pub struct TransportWriter {
    tx: mpsc::Sender<Value>,
}

impl TransportWriter {
    pub fn new(tx: mpsc::Sender<Value>) -> Self {
        Self { tx }
    }

    /// Write a JSON message. Returns error if the transport is closed.
    pub async fn write(&self, message: Value) -> Result<()> {
        self.tx.send(message).await.map_err(|_| Error::TransportClosed)
    }
}

/// A bidirectional channel of newline-delimited JSON messages to a tool server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start the peer.
    ///
    /// Returns a receiver for incoming messages and a writer for outgoing messages.
    async fn connect(&mut self) -> Result<(mpsc::Receiver<Result<Value>>, TransportWriter)>;

    /// Stop the peer and release its resources.
    async fn close(&mut self) -> Result<()>;

    /// Check if the transport is still connected.
    fn is_ready(&self) -> bool;
}
