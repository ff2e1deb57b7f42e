//! Built-in protocol methods
//!
//! `initialize`, `initialized`, `tools/list`, `tools/call`, `shutdown` and
//! `ping`, each implemented as a [`MethodHandler`].

use crate::mcp::errors::McpError;
use crate::mcp::protocol::*;
use crate::mcp::server::{MethodHandler, StopSignal};
use crate::mcp::tools::{Arguments, ToolRegistry};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};

/// Handles `initialize`: protocol version, capabilities and server identity
#[derive(Debug)]
pub struct InitializeHandler {
    server_info: Implementation,
}

impl InitializeHandler {
    #[inline]
    pub fn new(server_info: Implementation) -> Self {
        Self { server_info }
    }
}

#[async_trait]
impl MethodHandler for InitializeHandler {
    #[inline]
    async fn handle(&self, params: Option<Value>) -> Result<Value> {
        if let Some(client) = params
            .as_ref()
            .and_then(|p| p.get("clientInfo"))
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
        {
            info!("Initializing session for client: {}", client);
        }

        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability { list_changed: true },
            },
            server_info: self.server_info.clone(),
        };

        Ok(serde_json::to_value(result)?)
    }
}

/// Handles the `initialized` notification
#[derive(Debug)]
pub struct InitializedHandler;

#[async_trait]
impl MethodHandler for InitializedHandler {
    #[inline]
    async fn handle(&self, _params: Option<Value>) -> Result<Value> {
        info!("Client initialized");
        Ok(json!({}))
    }
}

/// Handles `tools/list`
#[derive(Debug)]
pub struct ListToolsHandler {
    registry: Arc<ToolRegistry>,
}

impl ListToolsHandler {
    #[inline]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl MethodHandler for ListToolsHandler {
    #[inline]
    async fn handle(&self, _params: Option<Value>) -> Result<Value> {
        let tools = self
            .registry
            .list()
            .await
            .iter()
            .map(|definition| definition.to_descriptor())
            .collect();

        Ok(serde_json::to_value(ListToolsResult { tools })?)
    }
}

/// Handles `tools/call`.
///
/// A tool that is missing, rejects its arguments or fails is reported as a
/// successful response carrying `isError: true`, not as a protocol error.
#[derive(Debug)]
pub struct CallToolHandler {
    registry: Arc<ToolRegistry>,
}

impl CallToolHandler {
    #[inline]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    async fn call(&self, params: Option<Value>) -> Result<CallToolResult> {
        let Some(Value::Object(mut params)) = params else {
            return Ok(CallToolResult::error("Missing parameters"));
        };

        let name = match params.remove("name") {
            Some(Value::String(name)) if !name.is_empty() => name,
            _ => return Ok(CallToolResult::error("Missing tool name")),
        };

        let arguments = match params.remove("arguments") {
            None | Some(Value::Null) => Arguments::new(),
            Some(Value::Object(arguments)) => arguments,
            Some(_) => {
                return Err(McpError::InvalidParameters {
                    message: "arguments must be an object".to_string(),
                }
                .into());
            }
        };

        debug!("Calling tool: {}", name);
        let result = self.registry.execute(&name, arguments).await;

        if result.success {
            Ok(CallToolResult::text(result.rendered_text()))
        } else {
            let message = result.error.as_deref().unwrap_or("Unknown error");
            Ok(CallToolResult::error(message))
        }
    }
}

#[async_trait]
impl MethodHandler for CallToolHandler {
    #[inline]
    async fn handle(&self, params: Option<Value>) -> Result<Value> {
        let result = self.call(params).await?;
        Ok(serde_json::to_value(result)?)
    }
}

/// Handles `shutdown`: the run loop stops at its next boundary
#[derive(Debug)]
pub struct ShutdownHandler {
    stop: Arc<StopSignal>,
}

impl ShutdownHandler {
    pub(crate) fn new(stop: Arc<StopSignal>) -> Self {
        Self { stop }
    }
}

#[async_trait]
impl MethodHandler for ShutdownHandler {
    #[inline]
    async fn handle(&self, _params: Option<Value>) -> Result<Value> {
        info!("Shutdown requested");
        self.stop.request();
        Ok(json!({}))
    }
}

/// Handles `ping`
#[derive(Debug)]
pub struct PingHandler;

#[async_trait]
impl MethodHandler for PingHandler {
    #[inline]
    async fn handle(&self, _params: Option<Value>) -> Result<Value> {
        Ok(serde_json::to_value(PingResult { pong: true })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::tools::{ContentType, ParameterType, Tool, ToolParameter, ToolResult};

    struct Report;

    impl Tool for Report {
        fn name(&self) -> &str {
            "report"
        }

        fn description(&self) -> &str {
            "Builds a structured report"
        }

        fn parameters(&self) -> Vec<ToolParameter> {
            vec![ToolParameter::new("topic", ParameterType::String, "Report topic").required()]
        }

        fn execute(&self, arguments: Arguments) -> anyhow::Result<ToolResult> {
            Ok(ToolResult::json(json!({ "topic": arguments["topic"], "lines": 2 })))
        }
    }

    async fn registry_with_report() -> Arc<ToolRegistry> {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(Report)).await;
        registry
    }

    #[tokio::test]
    async fn initialize_advertises_list_changed() {
        let handler = InitializeHandler::new(Implementation {
            name: "demo".to_string(),
            version: "1.2.3".to_string(),
        });

        let result = handler
            .handle(Some(json!({ "clientInfo": { "name": "probe" } })))
            .await
            .expect("initialize succeeds");

        assert_eq!(result["protocolVersion"], MCP_VERSION);
        assert_eq!(result["capabilities"]["tools"]["listChanged"], true);
        assert_eq!(result["serverInfo"], json!({ "name": "demo", "version": "1.2.3" }));
    }

    #[tokio::test]
    async fn ping_and_initialized_payloads() {
        let pong = PingHandler.handle(None).await.expect("ping succeeds");
        assert_eq!(pong, json!({ "pong": true }));

        let ack = InitializedHandler.handle(None).await.expect("ack succeeds");
        assert_eq!(ack, json!({}));
    }

    #[tokio::test]
    async fn call_renders_structured_content_indented() {
        let handler = CallToolHandler::new(registry_with_report().await);

        let result = handler
            .handle(Some(json!({ "name": "report", "arguments": { "topic": "rust" } })))
            .await
            .expect("call succeeds");

        let expected = ToolResult::json(json!({ "topic": "rust", "lines": 2 }));
        assert_eq!(expected.content_type, ContentType::Json);
        assert_eq!(result["content"][0]["type"], "text");
        assert_eq!(result["content"][0]["text"], expected.rendered_text());
        assert!(result.get("isError").is_none());
    }

    #[tokio::test]
    async fn call_failures_are_in_band() {
        let handler = CallToolHandler::new(registry_with_report().await);

        let missing_tool = handler
            .handle(Some(json!({ "name": "nope" })))
            .await
            .expect("reported in band");
        assert_eq!(missing_tool["isError"], true);
        assert_eq!(missing_tool["content"][0]["text"], "Error: Tool not found: nope");

        let missing_param = handler
            .handle(Some(json!({ "name": "report", "arguments": {} })))
            .await
            .expect("reported in band");
        assert_eq!(missing_param["isError"], true);
        assert_eq!(
            missing_param["content"][0]["text"],
            "Error: Missing required parameter: topic"
        );

        let missing_name = handler
            .handle(Some(json!({ "arguments": {} })))
            .await
            .expect("reported in band");
        assert_eq!(missing_name["isError"], true);
        assert_eq!(missing_name["content"][0]["text"], "Error: Missing tool name");

        let no_params = handler.handle(None).await.expect("reported in band");
        assert_eq!(no_params["isError"], true);
    }

    #[tokio::test]
    async fn non_object_arguments_are_invalid_params() {
        let handler = CallToolHandler::new(registry_with_report().await);

        let error = handler
            .handle(Some(json!({ "name": "report", "arguments": [1, 2] })))
            .await
            .expect_err("arguments must be an object");

        let mcp_error = error.downcast_ref::<McpError>().expect("typed error");
        assert_eq!(mcp_error.code(), ErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn list_reflects_registry() {
        let registry = registry_with_report().await;
        let handler = ListToolsHandler::new(Arc::clone(&registry));

        let listed = handler.handle(None).await.expect("list succeeds");
        let tools = listed["tools"].as_array().expect("tools array");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "report");
        assert_eq!(tools[0]["inputSchema"]["required"], json!(["topic"]));

        registry.unregister("report").await;
        let listed = handler.handle(None).await.expect("list succeeds");
        assert_eq!(listed["tools"], json!([]));
    }
}
