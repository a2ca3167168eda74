//! Client Connection
//!
//! Write half of an accepted socket. Every outbound frame goes through
//! [`Connection::send`], which holds the connection's write lock for exactly
//! one framed write. This lock is always the innermost lock a task takes.
//!
//! A failed or timed-out write marks the connection closed and wakes the
//! worker that owns the read half, so cleanup runs from one place.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::network::protocol::Response;

/// Boxed write half of a client stream.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Outbound write errors.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Connection was already closed.
    #[error("connection closed")]
    Closed,

    /// Socket write failed.
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    /// Socket did not accept the frame in time.
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
}

/// Shared handle to one client's socket.
pub struct Connection {
    peer: SocketAddr,
    writer: Mutex<BoxedWriter>,
    closed: AtomicBool,
    close_notify: Notify,
    write_timeout: Duration,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    /// Wrap the write half of a stream.
    pub fn new<W>(peer: SocketAddr, writer: W, write_timeout: Duration) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            peer,
            writer: Mutex::new(Box::new(writer)),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
            write_timeout,
        }
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Write one response frame.
    pub async fn send(&self, response: &Response) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }

        let frame = response.encode();
        let mut writer = self.writer.lock().await;
        let write = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        };

        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.close();
                Err(SendError::Io(e))
            }
            Err(_) => {
                self.close();
                Err(SendError::Timeout(self.write_timeout))
            }
        }
    }

    /// Mark closed and wake the owning worker. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Connection {} marked closed", self.peer);
            self.close_notify.notify_one();
        }
    }

    /// Whether the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once [`Connection::close`] has been called.
    pub async fn closed(&self) {
        while !self.is_closed() {
            self.close_notify.notified().await;
        }
    }

    /// Flush and shut down the write half.
    pub async fn shutdown(&self) {
        self.close();
        let mut writer = self.writer.lock().await;
        let _ = tokio::time::timeout(self.write_timeout, writer.shutdown()).await;
    }
}
