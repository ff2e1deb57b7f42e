//! Transports
//!
//! A transport is a duplex channel carrying one JSON message at a time in
//! each direction. Two implementations are provided: [`StreamTransport`]
//! frames messages with `Content-Length` headers over a byte stream, and
//! [`SocketTransport`] maps each message onto one WebSocket frame.

mod pool;
mod socket;
mod stream;

pub use pool::{SharedTransport, TransportPool};
pub use socket::SocketTransport;
pub use stream::{MAX_MESSAGE_BYTES, StreamTransport};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Transport-level failures
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport is closed")]
    Closed,

    #[error("Invalid JSON: {message}")]
    Parse { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Bidirectional message channel
#[async_trait]
pub trait Transport: Send {
    /// Serialize and write one message
    async fn send(&mut self, message: &Value) -> Result<(), TransportError>;

    /// Wait for the next message; `Ok(None)` means the peer finished cleanly
    async fn receive(&mut self) -> Result<Option<Value>, TransportError>;

    /// Release the channel. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;

    fn is_closed(&self) -> bool;
}

#[async_trait]
impl<T> Transport for Box<T>
where
    T: Transport + ?Sized,
{
    #[inline]
    async fn send(&mut self, message: &Value) -> Result<(), TransportError> {
        (**self).send(message).await
    }

    #[inline]
    async fn receive(&mut self) -> Result<Option<Value>, TransportError> {
        (**self).receive().await
    }

    #[inline]
    async fn close(&mut self) -> Result<(), TransportError> {
        (**self).close().await
    }

    #[inline]
    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// Run `body` with the transport, then close it whatever the outcome.
///
/// If the returned future is dropped before completion the transport is
/// dropped with it, which releases the underlying stream or socket.
#[inline]
pub async fn using<T, R, F>(mut transport: T, body: F) -> R
where
    T: Transport,
    F: for<'t> FnOnce(&'t mut T) -> BoxFuture<'t, R>,
{
    let result = body(&mut transport).await;
    if let Err(e) = transport.close().await {
        warn!("Failed to close transport: {}", e);
    }
    result
}

/// Decode one message body: UTF-8 text holding a JSON value
pub(crate) fn decode(body: &[u8]) -> Result<Value, TransportError> {
    let text = std::str::from_utf8(body).map_err(|e| TransportError::Parse {
        message: format!("Message body is not valid UTF-8: {}", e),
    })?;
    serde_json::from_str(text).map_err(|e| TransportError::Parse {
        message: e.to_string(),
    })
}
