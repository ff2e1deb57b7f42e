//! MCP Server Implementation
//!
//! This module provides the dispatcher that binds the built-in protocol
//! methods and custom handlers, admits requests through a bounded gate,
//! enforces the per-request deadline and drives one transport's
//! request/response loop.

use crate::config::ServerConfig;
use crate::mcp::errors::{McpError, error_response};
use crate::mcp::handlers::{
    CallToolHandler, InitializeHandler, InitializedHandler, ListToolsHandler, PingHandler,
    ShutdownHandler,
};
use crate::mcp::protocol::*;
use crate::mcp::tools::{Tool, ToolProvider, ToolRegistry};
use crate::mcp::transport::{Transport, TransportError};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore, watch};
use tracing::{debug, error, info, warn};

/// Lifecycle of a server instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Handlers registered, not yet consuming a transport
    Created,
    /// Inside [`McpServer::run`]
    Running,
    /// Terminal
    Stopped,
}

/// Handler trait for protocol methods
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn handle(&self, params: Option<Value>) -> Result<Value>;
}

/// Adapter turning an async closure into a [`MethodHandler`]
pub struct FnHandler<F>(F);

/// Wrap an async function of `params` as a method handler
#[inline]
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> MethodHandler for FnHandler<F>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    #[inline]
    async fn handle(&self, params: Option<Value>) -> Result<Value> {
        (self.0)(params).await
    }
}

/// Stop request shared between the run loop, `shutdown` and [`McpServer::stop`]
#[derive(Debug)]
pub(crate) struct StopSignal {
    tx: watch::Sender<bool>,
}

impl StopSignal {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub(crate) fn request(&self) {
        self.tx.send_replace(true);
    }

    fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }

    async fn requested(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once set.
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

type HandlerMap = HashMap<String, Arc<dyn MethodHandler>>;

/// MCP Server state and configuration
pub struct McpServer {
    config: Arc<ServerConfig>,
    registry: Arc<ToolRegistry>,
    /// Built-in protocol methods, bound to this instance
    builtins: HandlerMap,
    /// Custom methods, shared with every session
    handlers: Arc<RwLock<HandlerMap>>,
    /// Admission gate, shared with every session
    admission: Arc<Semaphore>,
    state: watch::Sender<ServerState>,
    stop: Arc<StopSignal>,
}

impl McpServer {
    /// Create a new MCP server with an empty tool registry
    #[inline]
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry(config, Arc::new(ToolRegistry::new()))
    }

    /// Create a new MCP server around an existing registry
    #[inline]
    pub fn with_registry(config: ServerConfig, registry: Arc<ToolRegistry>) -> Self {
        let admission = Arc::new(Semaphore::new(config.max_concurrent_requests.max(1)));
        Self::assemble(
            Arc::new(config),
            registry,
            Arc::new(RwLock::new(HashMap::new())),
            admission,
        )
    }

    fn assemble(
        config: Arc<ServerConfig>,
        registry: Arc<ToolRegistry>,
        handlers: Arc<RwLock<HandlerMap>>,
        admission: Arc<Semaphore>,
    ) -> Self {
        let stop = Arc::new(StopSignal::new());
        let (state, _) = watch::channel(ServerState::Created);

        let server_info = Implementation {
            name: config.name.clone(),
            version: config.version.clone(),
        };

        let mut builtins: HandlerMap = HashMap::new();
        builtins.insert(
            "initialize".to_string(),
            Arc::new(InitializeHandler::new(server_info)),
        );
        builtins.insert("initialized".to_string(), Arc::new(InitializedHandler));
        builtins.insert(
            "tools/list".to_string(),
            Arc::new(ListToolsHandler::new(Arc::clone(&registry))),
        );
        builtins.insert(
            "tools/call".to_string(),
            Arc::new(CallToolHandler::new(Arc::clone(&registry))),
        );
        builtins.insert(
            "shutdown".to_string(),
            Arc::new(ShutdownHandler::new(Arc::clone(&stop))),
        );
        builtins.insert("ping".to_string(), Arc::new(PingHandler));

        Self {
            config,
            registry,
            builtins,
            handlers,
            admission,
            state,
            stop,
        }
    }

    /// A fresh server for another connection.
    ///
    /// The new instance starts in [`ServerState::Created`] and shares the
    /// configuration, tool registry, custom handlers and admission gate.
    #[inline]
    #[must_use]
    pub fn session(&self) -> Self {
        Self::assemble(
            Arc::clone(&self.config),
            Arc::clone(&self.registry),
            Arc::clone(&self.handlers),
            Arc::clone(&self.admission),
        )
    }

    #[inline]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Register a tool with the server
    #[inline]
    pub async fn register_tool(&self, tool: Arc<dyn Tool>) {
        self.registry.register(tool).await;
    }

    /// Register a handler for a method name. Custom handlers take precedence
    /// over built-in methods of the same name.
    #[inline]
    pub async fn register_handler<H>(&self, method: impl Into<String>, handler: H)
    where
        H: MethodHandler + 'static,
    {
        let method = method.into();
        debug!("Registered handler: {}", method);
        self.handlers
            .write()
            .await
            .insert(method, Arc::new(handler));
    }

    #[inline]
    pub async fn has_handler(&self, method: &str) -> bool {
        self.resolve(method).await.is_some()
    }

    async fn resolve(&self, method: &str) -> Option<Arc<dyn MethodHandler>> {
        let custom = self.handlers.read().await.get(method).cloned();
        custom.or_else(|| self.builtins.get(method).cloned())
    }

    #[inline]
    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Signal the server to stop. A running loop exits at its next
    /// boundary, even while waiting for input.
    #[inline]
    pub fn stop(&self) {
        self.stop.request();
        self.state.send_if_modified(|state| {
            if *state == ServerState::Created {
                *state = ServerState::Stopped;
                true
            } else {
                false
            }
        });
    }

    #[inline]
    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_requested()
    }

    fn request_timeout(&self) -> Duration {
        self.config.request_timeout_duration()
    }

    /// Process a single request: resolve, admit, run under the deadline.
    #[inline]
    pub async fn process_request(&self, request: Request) -> Response {
        let Request {
            id, method, params, ..
        } = request;

        let Some(handler) = self.resolve(&method).await else {
            warn!("Unknown method: {}", method);
            return McpError::MethodNotFound { method }.to_response(id);
        };

        let Ok(_permit) = self.admission.acquire().await else {
            return McpError::InternalError {
                message: "Admission gate closed".to_string(),
            }
            .to_response(id);
        };

        let timeout = self.request_timeout();
        debug!("Dispatching {} (id: {:?})", method, id);

        let mut task = tokio::spawn(async move { handler.handle(params).await });

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(Ok(result))) => Response::success(id, result),
            Ok(Ok(Err(e))) => {
                error!("Error handling request {}: {:#}", method, e);
                error_response(&e, id)
            }
            Ok(Err(join_error)) => {
                error!("Handler for {} did not complete: {}", method, join_error);
                McpError::InternalError {
                    message: format!("Handler for '{}' panicked", method),
                }
                .to_response(id)
            }
            Err(_) => {
                task.abort();
                warn!("Request {} timed out after {:?}", method, timeout);
                McpError::Timeout {
                    seconds: timeout.as_secs_f64(),
                }
                .to_response(id)
            }
        }
    }

    /// Handle one incoming message; returns the wire response, if any.
    ///
    /// Notifications, responses and bare messages produce no response.
    #[inline]
    pub async fn handle_message<'a>(&self, raw: impl Into<RawMessage<'a>>) -> Option<Value> {
        let raw = raw.into();
        let (fallback_id, text) = match &raw {
            RawMessage::Value(value) => (recover_id(value), None),
            RawMessage::Text(text) => (None, Some(*text)),
        };

        match parse_message(raw) {
            Ok(Message::Request(request)) => {
                let notification = request.is_notification();
                let method = request.method.clone();
                let response = self.process_request(request).await;
                if notification {
                    debug!("Notification {} handled", method);
                    None
                } else {
                    Some(response.to_value())
                }
            }
            Ok(Message::Response(_)) => {
                warn!("Received unexpected response message from client");
                None
            }
            Ok(Message::Other(envelope)) => {
                debug!("Ignoring message without method (id: {:?})", envelope.id);
                None
            }
            Err(e) => {
                e.log();
                let id = fallback_id.or_else(|| {
                    text.and_then(|t| serde_json::from_str::<Value>(t).ok())
                        .as_ref()
                        .and_then(recover_id)
                });
                Some(e.to_response(id).to_value())
            }
        }
    }

    /// Run the server main loop on a transport until end-of-stream, a stop
    /// request or a transport fault. The transport is closed on every exit,
    /// including when this future is dropped mid-session.
    #[inline]
    pub async fn run<T>(&self, mut transport: T) -> crate::Result<()>
    where
        T: Transport + 'static,
    {
        let started = self.state.send_if_modified(|state| {
            if *state == ServerState::Created {
                *state = ServerState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            if let Err(e) = transport.close().await {
                warn!("Failed to close transport: {}", e);
            }
            return Err(crate::ServerError::InvalidState(self.state()));
        }

        info!(
            "MCP Server {} v{} starting",
            self.config.name, self.config.version
        );

        let mut session = RunningSession {
            state: &self.state,
            transport: Some(transport),
        };
        let outcome = match session.transport.as_mut() {
            Some(transport) => self.serve(transport).await,
            None => Ok(()),
        };
        session.finish().await;
        info!("Server stopped");

        outcome.map_err(Into::into)
    }

    async fn serve<T>(&self, transport: &mut T) -> Result<(), TransportError>
    where
        T: Transport,
    {
        while !self.stop.is_requested() {
            let received = tokio::select! {
                received = transport.receive() => received,
                () = self.stop.requested() => {
                    info!("Stop requested");
                    break;
                }
            };

            match received {
                Ok(None) => {
                    info!("EOF received, shutting down");
                    break;
                }
                Ok(Some(message)) => {
                    if let Some(response) = self.handle_message(message).await {
                        transport.send(&response).await?;
                    }
                }
                Err(TransportError::Parse { message }) => {
                    error!("Parse error: {}", message);
                    let response = McpError::ParseError { message }.to_response(None);
                    transport.send(&response.to_value()).await?;
                }
                Err(e) => {
                    error!("Error in main loop: {}", e);
                    return Err(e);
                }
            }
        }

        Ok(())
    }
}

/// Ties a transport to a running server: dropping it marks the server
/// stopped and closes the transport if that has not happened yet.
struct RunningSession<'a, T: Transport + 'static> {
    state: &'a watch::Sender<ServerState>,
    transport: Option<T>,
}

impl<T: Transport + 'static> RunningSession<'_, T> {
    async fn finish(mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                warn!("Failed to close transport: {}", e);
            }
        }
    }
}

impl<T: Transport + 'static> Drop for RunningSession<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.state.send_replace(ServerState::Stopped);

        let Some(mut transport) = self.transport.take() else {
            return;
        };
        if transport.is_closed() {
            return;
        }
        // The run was cancelled; finish closing on the runtime.
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = transport.close().await {
                        warn!("Failed to close transport after cancelled run: {}", e);
                    }
                });
            }
            Err(_) => warn!("No runtime left to close the transport of a cancelled run"),
        }
    }
}

impl fmt::Debug for McpServer {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpServer")
            .field("name", &self.config.name)
            .field("version", &self.config.version)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Create an MCP server with configuration and tools.
///
/// Each provider contributes its family's tools only when that family is
/// enabled in `config`; `tools` are registered afterwards and win on name
/// collisions.
#[inline]
pub async fn create_server(
    config: ServerConfig,
    providers: &[Arc<dyn ToolProvider>],
    tools: Vec<Arc<dyn Tool>>,
) -> McpServer {
    let allowed_paths = config.allowed_paths.clone();
    let server = McpServer::new(config);

    for provider in providers {
        let family = provider.family();
        if !server.config().is_enabled(family) {
            debug!("Skipping disabled tool family: {}", family);
            continue;
        }
        for tool in provider.tools(allowed_paths.as_deref()) {
            server.register_tool(tool).await;
        }
    }

    for tool in tools {
        server.register_tool(tool).await;
    }

    server
}
