//! MCP Protocol Types and Messages
//!
//! This module defines the JSON-RPC 2.0 envelopes exchanged with a client,
//! the MCP payloads carried inside them, and the classification of raw wire
//! data into typed messages.

use crate::mcp::errors::McpError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// MCP Protocol Version
pub const MCP_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 version identifier
pub const JSONRPC_VERSION: &str = "2.0";

/// Correlation identifier for JSON-RPC messages
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl RequestId {
    #[inline]
    pub fn to_value(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Number(n) => Value::from(*n),
        }
    }
}

impl fmt::Display for RequestId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<String> for RequestId {
    #[inline]
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for RequestId {
    #[inline]
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for RequestId {
    #[inline]
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

/// Generate a process-unique message id
#[inline]
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Stable error codes carried in [`ErrorObject::code`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ToolNotFound,
    ToolExecutionError,
    PermissionDenied,
    Timeout,
}

impl ErrorCode {
    const ALL: [Self; 9] = [
        Self::ParseError,
        Self::InvalidRequest,
        Self::MethodNotFound,
        Self::InvalidParams,
        Self::InternalError,
        Self::ToolNotFound,
        Self::ToolExecutionError,
        Self::PermissionDenied,
        Self::Timeout,
    ];

    #[inline]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            // Server-defined range
            Self::ToolNotFound => -32000,
            Self::ToolExecutionError => -32001,
            Self::PermissionDenied => -32002,
            Self::Timeout => -32003,
        }
    }

    #[inline]
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

impl From<ErrorCode> for i32 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// JSON-RPC 2.0 Error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    #[inline]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    #[inline]
    pub fn from_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code.code(), message)
    }

    #[inline]
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The enumerated code, if this object carries one of the known values
    #[inline]
    pub fn kind(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }

    #[inline]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("code".to_string(), Value::from(self.code));
        map.insert("message".to_string(), Value::String(self.message.clone()));
        if let Some(data) = &self.data {
            map.insert("data".to_string(), data.clone());
        }
        Value::Object(map)
    }
}

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_string()
}

/// A message that is neither a request nor a response.
///
/// Such messages are accepted off the wire but never dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

impl Envelope {
    #[inline]
    pub fn new(id: Option<RequestId>) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
        }
    }
}

/// JSON-RPC 2.0 Request message.
///
/// A request without an `id` is a notification: it is executed but never
/// answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Create a request with a freshly generated id
    #[inline]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::with_id(RequestId::String(generate_id()), method, params)
    }

    #[inline]
    pub fn with_id(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    #[inline]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id: None,
            method: method.into(),
            params,
        }
    }

    #[inline]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    fn from_map(map: Map<String, Value>) -> Result<Self, McpError> {
        let request: Self =
            serde_json::from_value(Value::Object(map)).map_err(|e| McpError::InvalidMessage {
                message: e.to_string(),
            })?;

        if request.method.is_empty() {
            return Err(McpError::InvalidRequest {
                message: "method must be a non-empty string".to_string(),
            });
        }

        Ok(request)
    }
}

/// Outcome carried by a response: exactly one of `result` or `error`
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Result(Value),
    Error(ErrorObject),
}

/// JSON-RPC 2.0 Response message
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    pub outcome: Outcome,
}

impl Response {
    #[inline]
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            outcome: Outcome::Result(result),
        }
    }

    #[inline]
    pub fn failure(id: Option<RequestId>, error: ErrorObject) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            outcome: Outcome::Error(error),
        }
    }

    #[inline]
    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Result(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }

    #[inline]
    pub fn error(&self) -> Option<&ErrorObject> {
        match &self.outcome {
            Outcome::Result(_) => None,
            Outcome::Error(error) => Some(error),
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    /// Wire form. `id` is always present (null when unknown).
    #[inline]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("jsonrpc".to_string(), Value::String(self.jsonrpc.clone()));
        map.insert(
            "id".to_string(),
            self.id.as_ref().map_or(Value::Null, RequestId::to_value),
        );
        match &self.outcome {
            Outcome::Result(result) => map.insert("result".to_string(), result.clone()),
            Outcome::Error(error) => map.insert("error".to_string(), error.to_value()),
        };
        Value::Object(map)
    }

    fn from_map(mut map: Map<String, Value>) -> Result<Self, McpError> {
        let invalid = |message: String| McpError::InvalidMessage { message };

        let jsonrpc = match map.remove("jsonrpc") {
            Some(Value::String(version)) => version,
            Some(other) => return Err(invalid(format!("jsonrpc must be a string, got {}", other))),
            None => default_jsonrpc(),
        };
        let id = match map.remove("id") {
            Some(value) => serde_json::from_value::<Option<RequestId>>(value)
                .map_err(|e| invalid(format!("invalid id: {}", e)))?,
            None => None,
        };

        let outcome = match (map.remove("result"), map.remove("error")) {
            (Some(_), Some(_)) => {
                return Err(invalid(
                    "response carries both result and error".to_string(),
                ));
            }
            (Some(result), None) => Outcome::Result(result),
            (None, Some(error)) => Outcome::Error(
                serde_json::from_value(error)
                    .map_err(|e| invalid(format!("invalid error object: {}", e)))?,
            ),
            (None, None) => return Err(invalid("response carries no outcome".to_string())),
        };

        Ok(Self {
            jsonrpc,
            id,
            outcome,
        })
    }
}

impl Serialize for Response {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Response {
    #[inline]
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Object(map) => Self::from_map(map).map_err(serde::de::Error::custom),
            _ => Err(serde::de::Error::custom("response must be a JSON object")),
        }
    }
}

/// Any message that can arrive over a transport
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
    Other(Envelope),
}

impl Message {
    #[inline]
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(request) => request.id.as_ref(),
            Self::Response(response) => response.id.as_ref(),
            Self::Other(envelope) => envelope.id.as_ref(),
        }
    }

    #[inline]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Request(request) => serde_json::to_value(request).unwrap_or(Value::Null),
            Self::Response(response) => response.to_value(),
            Self::Other(envelope) => serde_json::to_value(envelope).unwrap_or(Value::Null),
        }
    }
}

/// Raw input accepted by [`parse_message`]: undecoded text or a decoded value
#[derive(Debug, Clone)]
pub enum RawMessage<'a> {
    Text(&'a str),
    Value(Value),
}

impl<'a> From<&'a str> for RawMessage<'a> {
    #[inline]
    fn from(text: &'a str) -> Self {
        Self::Text(text)
    }
}

impl<'a> From<&'a String> for RawMessage<'a> {
    #[inline]
    fn from(text: &'a String) -> Self {
        Self::Text(text.as_str())
    }
}

impl From<Value> for RawMessage<'_> {
    #[inline]
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Parse raw wire data into a typed message.
///
/// Objects with a `method` are requests; objects with `result` or `error`
/// are responses; any other object is a bare [`Envelope`].
#[inline]
pub fn parse_message<'a>(raw: impl Into<RawMessage<'a>>) -> Result<Message, McpError> {
    let value = match raw.into() {
        RawMessage::Text(text) => serde_json::from_str(text)?,
        RawMessage::Value(value) => value,
    };

    let Value::Object(map) = value else {
        return Err(McpError::InvalidMessage {
            message: "Message must be a JSON object".to_string(),
        });
    };

    if map.contains_key("method") {
        Request::from_map(map).map(Message::Request)
    } else if map.contains_key("result") || map.contains_key("error") {
        Response::from_map(map).map(Message::Response)
    } else {
        serde_json::from_value(Value::Object(map))
            .map(Message::Other)
            .map_err(|e| McpError::InvalidMessage {
                message: e.to_string(),
            })
    }
}

/// Best-effort recovery of the `id` from a payload that failed to parse
#[inline]
pub fn recover_id(raw: &Value) -> Option<RequestId> {
    raw.get("id")
        .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok())
}

/// Implementation information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

/// Tools capability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Server capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    pub tools: ToolsCapability,
}

/// MCP Initialize Response result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,
}

/// Tool definition as advertised by `tools/list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// List tools response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDescriptor>,
}

/// Tool content types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

/// Tool call result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    #[inline]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: None,
        }
    }

    /// A failed call, reported inside a successful response
    #[inline]
    pub fn error(message: impl fmt::Display) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: format!("Error: {}", message),
            }],
            is_error: Some(true),
        }
    }
}

/// Acknowledgment payload returned by `ping`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PingResult {
    pub pong: bool,
}
