use super::{Transport, TransportError, decode};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info};

/// Message-oriented transport over a WebSocket: one message per frame
#[derive(Debug)]
pub struct SocketTransport<S> {
    socket: WebSocketStream<S>,
    closed: bool,
}

impl<S> SocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    #[inline]
    pub fn new(socket: WebSocketStream<S>) -> Self {
        Self {
            socket,
            closed: false,
        }
    }
}

/// Whether a WebSocket failure means the peer is gone rather than a fault
fn is_channel_closed(error: &WsError) -> bool {
    matches!(
        error,
        WsError::ConnectionClosed
            | WsError::AlreadyClosed
            | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)
    )
}

#[async_trait]
impl<S> Transport for SocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    #[inline]
    async fn send(&mut self, message: &Value) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let text = serde_json::to_string(message)?;
        self.socket
            .send(Message::Text(text))
            .await
            .map_err(|e| {
                if is_channel_closed(&e) {
                    TransportError::Closed
                } else {
                    TransportError::WebSocket(e.to_string())
                }
            })
    }

    #[inline]
    async fn receive(&mut self) -> Result<Option<Value>, TransportError> {
        if self.closed {
            return Ok(None);
        }

        loop {
            match self.socket.next().await {
                None => return Ok(None),
                Some(Ok(Message::Text(text))) => return decode(text.as_bytes()).map(Some),
                Some(Ok(Message::Binary(bytes))) => return decode(&bytes).map(Some),
                Some(Ok(Message::Close(_))) => {
                    info!("WebSocket connection closed by peer");
                    return Ok(None);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                    debug!("Skipping control frame");
                }
                Some(Err(e)) if is_channel_closed(&e) => return Ok(None),
                Some(Err(e)) => return Err(TransportError::WebSocket(e.to_string())),
            }
        }
    }

    #[inline]
    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.socket.close(None).await {
            Ok(()) => Ok(()),
            Err(e) if is_channel_closed(&e) => Ok(()),
            Err(e) => Err(TransportError::WebSocket(e.to_string())),
        }
    }

    #[inline]
    fn is_closed(&self) -> bool {
        self.closed
    }
}
