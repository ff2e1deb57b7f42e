//! MCP (Model Context Protocol) Server Implementation
//!
//! This module provides a JSON-RPC 2.0 protocol engine following MCP
//! protocol version 2024-11-05: message model, transports, tool registry and
//! the dispatcher tying them together.


pub mod errors;
pub mod handlers;
pub mod protocol;
pub mod server;
pub mod tools;
pub mod transport;

pub use errors::McpError;
pub use server::{McpServer, MethodHandler, ServerState, create_server, handler_fn};
pub use tools::{Tool, ToolProvider, ToolRegistry, ToolResult};
pub use transport::{SocketTransport, StreamTransport, Transport, TransportError};
