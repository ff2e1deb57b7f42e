//! MCP Tools Implementation
//!
//! This module defines the capability contract every tool satisfies, the
//! schema types describing tool parameters, and the registry that looks tools
//! up by name and mediates their execution.

use crate::config::ToolFamily;
use crate::mcp::protocol::ToolDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

/// Argument bag passed to [`Tool::execute`]
pub type Arguments = Map<String, Value>;

/// Primitive type vocabulary for tool parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Integer,
    Boolean,
}

impl ParameterType {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ParameterType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool parameter definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
}

impl ToolParameter {
    #[inline]
    pub fn new(
        name: impl Into<String>,
        param_type: ParameterType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: false,
            default: None,
            allowed_values: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.allowed_values = Some(values);
        self
    }

    /// JSON-Schema property describing this parameter
    #[inline]
    pub fn to_json_schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".to_string(), json!(self.param_type.as_str()));
        schema.insert("description".to_string(), json!(self.description));
        if let Some(values) = &self.allowed_values {
            schema.insert("enum".to_string(), Value::Array(values.clone()));
        }
        if let Some(default) = &self.default {
            schema.insert("default".to_string(), default.clone());
        }
        Value::Object(schema)
    }
}

/// Tool definition: name, description and ordered parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
}

impl ToolDefinition {
    /// JSON-Schema object with `properties` and `required` derived from the parameters
    #[inline]
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            properties.insert(param.name.clone(), param.to_json_schema());
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    #[inline]
    pub fn to_descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema(),
        }
    }
}

/// How a tool result's content should be rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Json,
}

/// Result from tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub content: Value,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ToolResult {
    #[inline]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: Value::String(content.into()),
            content_type: ContentType::Text,
            error: None,
            metadata: Map::new(),
        }
    }

    #[inline]
    pub fn json(content: Value) -> Self {
        Self {
            success: true,
            content,
            content_type: ContentType::Json,
            error: None,
            metadata: Map::new(),
        }
    }

    #[inline]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: Value::String(String::new()),
            content_type: ContentType::Text,
            error: Some(error.into()),
            metadata: Map::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Content as client-facing text: strings verbatim, structured content indented
    #[inline]
    pub fn rendered_text(&self) -> String {
        match (self.content_type, &self.content) {
            (ContentType::Text, Value::String(text)) => text.clone(),
            (ContentType::Text, other) => other.to_string(),
            (ContentType::Json, value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

/// A named, schema-described capability.
///
/// Execution is synchronous; the registry runs it on the blocking pool.
/// Returning `Err` (or panicking) yields a failed [`ToolResult`].
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<ToolParameter>;

    fn execute(&self, arguments: Arguments) -> anyhow::Result<ToolResult>;
}

/// Derive the definition advertised for a tool
#[inline]
pub fn definition(tool: &dyn Tool) -> ToolDefinition {
    ToolDefinition {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        parameters: tool.parameters(),
    }
}

/// Check required parameters; returns the message for the first one missing
#[inline]
pub fn validate_arguments(tool: &dyn Tool, arguments: &Arguments) -> Option<String> {
    tool.parameters()
        .into_iter()
        .find(|param| param.required && !arguments.contains_key(&param.name))
        .map(|param| format!("Missing required parameter: {}", param.name))
}

/// Source of the tools belonging to one [`ToolFamily`].
///
/// `allowed_paths` is the configured allow-list of filesystem roots, passed
/// through untouched.
pub trait ToolProvider: Send + Sync {
    fn family(&self) -> ToolFamily;

    fn tools(&self, allowed_paths: Option<&[PathBuf]>) -> Vec<Arc<dyn Tool>>;
}

/// Registry for managing tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool already registered under its name
    #[inline]
    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let previous = self.tools.write().await.insert(name.clone(), tool);
        if previous.is_some() {
            debug!("Replaced tool: {}", name);
        } else {
            debug!("Registered tool: {}", name);
        }
    }

    #[inline]
    pub async fn unregister(&self, name: &str) -> bool {
        self.tools.write().await.remove(name).is_some()
    }

    #[inline]
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    #[inline]
    pub async fn contains(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    #[inline]
    pub async fn len(&self) -> usize {
        self.tools.read().await.len()
    }

    #[inline]
    pub async fn is_empty(&self) -> bool {
        self.tools.read().await.is_empty()
    }

    #[inline]
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of every registered tool's definition, sorted by name
    #[inline]
    pub async fn list(&self) -> Vec<ToolDefinition> {
        let tools: Vec<Arc<dyn Tool>> = self.tools.read().await.values().cloned().collect();
        let mut definitions: Vec<ToolDefinition> =
            tools.iter().map(|tool| definition(tool.as_ref())).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Look up, validate and run a tool. Never fails: every problem is a failed result.
    #[inline]
    pub async fn execute(&self, name: &str, arguments: Arguments) -> ToolResult {
        let Some(tool) = self.get(name).await else {
            warn!("Tool not found: {}", name);
            return ToolResult::failure(format!("Tool not found: {}", name));
        };

        if let Some(message) = validate_arguments(tool.as_ref(), &arguments) {
            debug!("Rejected call to {}: {}", name, message);
            return ToolResult::failure(message);
        }

        debug!("Executing tool: {}", name);
        let tool_name = name.to_string();
        match tokio::task::spawn_blocking(move || tool.execute(arguments)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!("Tool {} failed: {:#}", tool_name, e);
                ToolResult::failure(format!("{:#}", e))
            }
            Err(join_error) if join_error.is_panic() => {
                error!("Tool {} panicked", tool_name);
                ToolResult::failure(format!("Tool '{}' panicked during execution", tool_name))
            }
            Err(join_error) => ToolResult::failure(join_error.to_string()),
        }
    }
}

impl fmt::Debug for ToolRegistry {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry").finish_non_exhaustive()
    }
}
