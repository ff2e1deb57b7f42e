use super::Transport;
use futures::future::join_all;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A transport shared between tasks; the mutex serializes its sends
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// A set of transports that can be broadcast to and closed together
#[derive(Default)]
pub struct TransportPool {
    transports: Vec<SharedTransport>,
}

impl TransportPool {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transport; the returned handle identifies it for [`Self::remove`]
    #[inline]
    pub fn add<T>(&mut self, transport: T) -> SharedTransport
    where
        T: Transport + 'static,
    {
        let shared: SharedTransport = Arc::new(Mutex::new(Box::new(transport)));
        self.transports.push(Arc::clone(&shared));
        shared
    }

    #[inline]
    pub fn remove(&mut self, transport: &SharedTransport) -> bool {
        let before = self.transports.len();
        self.transports
            .retain(|member| !Arc::ptr_eq(member, transport));
        self.transports.len() != before
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.transports.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }

    /// Send `message` to every member concurrently; returns how many accepted it
    #[inline]
    pub async fn broadcast(&self, message: &Value) -> usize {
        let sends = self.transports.iter().map(|member| async move {
            let mut transport = member.lock().await;
            transport.send(message).await
        });

        let mut delivered = 0;
        for outcome in join_all(sends).await {
            match outcome {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Broadcast to transport failed: {}", e),
            }
        }
        debug!("Broadcast delivered to {}/{} transports", delivered, self.len());
        delivered
    }

    /// Close every member and empty the pool
    #[inline]
    pub async fn close_all(&mut self) {
        let closes = self.transports.drain(..).map(|member| async move {
            let mut transport = member.lock().await;
            transport.close().await
        });

        for outcome in join_all(closes).await {
            if let Err(e) = outcome {
                warn!("Failed to close transport: {}", e);
            }
        }
    }
}

impl fmt::Debug for TransportPool {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportPool")
            .field("len", &self.transports.len())
            .finish()
    }
}
