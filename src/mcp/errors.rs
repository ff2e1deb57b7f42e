//! MCP Error Handling
//!
//! This module classifies the failures the server can observe and maps each
//! of them onto the fixed JSON-RPC error codes sent back to the client.

use crate::mcp::protocol::*;
use thiserror::Error;
use tracing::error;

/// MCP-specific errors that can occur during server operation
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Invalid JSON: {message}")]
    ParseError { message: String },

    #[error("Invalid message: {message}")]
    InvalidMessage { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown method: {method}")]
    MethodNotFound { method: String },

    #[error("Invalid parameters: {message}")]
    InvalidParameters { message: String },

    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("Tool '{tool}' execution failed: {message}")]
    ToolExecutionFailed { tool: String, message: String },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: f64 },

    #[error("{message}")]
    InternalError { message: String },
}

impl McpError {
    /// The wire code this error is reported with
    #[inline]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ParseError { .. } | Self::InvalidMessage { .. } => ErrorCode::ParseError,
            Self::InvalidRequest { .. } => ErrorCode::InvalidRequest,
            Self::MethodNotFound { .. } => ErrorCode::MethodNotFound,
            Self::InvalidParameters { .. } => ErrorCode::InvalidParams,
            Self::ToolNotFound { .. } => ErrorCode::ToolNotFound,
            Self::ToolExecutionFailed { .. } => ErrorCode::ToolExecutionError,
            Self::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::InternalError { .. } => ErrorCode::InternalError,
        }
    }

    /// Convert MCP error to a JSON-RPC error object
    #[inline]
    pub fn to_error_object(&self) -> ErrorObject {
        ErrorObject::from_code(self.code(), self.to_string())
    }

    /// Create error response message
    #[inline]
    pub fn to_response(&self, id: Option<RequestId>) -> Response {
        Response::failure(id, self.to_error_object())
    }

    /// Log the error with appropriate level
    #[inline]
    pub fn log(&self) {
        match self {
            Self::ParseError { .. }
            | Self::InvalidMessage { .. }
            | Self::InvalidRequest { .. }
            | Self::InvalidParameters { .. }
            | Self::MethodNotFound { .. } => {
                error!("Client error: {}", self);
            }
            Self::ToolNotFound { .. } => {
                error!("Not found error: {}", self);
            }
            Self::ToolExecutionFailed { .. }
            | Self::Timeout { .. }
            | Self::InternalError { .. } => {
                error!("Server error: {}", self);
            }
            Self::PermissionDenied { .. } => {
                error!("MCP error: {}", self);
            }
        }
    }
}

/// Convert any handler failure into a failed response.
///
/// Typed [`McpError`]s keep their own code; everything else is an internal
/// error carrying the failure's message text.
#[inline]
pub fn error_response(error: &anyhow::Error, id: Option<RequestId>) -> Response {
    if let Some(mcp_error) = error.downcast_ref::<McpError>() {
        mcp_error.log();
        return mcp_error.to_response(id);
    }

    error!("Unexpected error: {:#}", error);
    McpError::InternalError {
        message: format!("{:#}", error),
    }
    .to_response(id)
}

impl From<serde_json::Error> for McpError {
    #[inline]
    fn from(error: serde_json::Error) -> Self {
        Self::ParseError {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn tool_not_found_error() {
        let error = McpError::ToolNotFound {
            name: "test_tool".to_string(),
        };

        let object = error.to_error_object();
        assert_eq!(object.code, -32000);
        assert!(object.message.contains("test_tool"));
    }

    #[test]
    fn malformed_payloads_share_the_parse_error_code() {
        let parse = McpError::ParseError {
            message: "eof".to_string(),
        };
        let shape = McpError::InvalidMessage {
            message: "not an object".to_string(),
        };

        assert_eq!(parse.to_error_object().code, -32700);
        assert_eq!(shape.to_error_object().code, -32700);
    }

    #[test]
    fn timeout_error_names_the_deadline() {
        let error = McpError::Timeout { seconds: 1.5 };
        let object = error.to_error_object();

        assert_eq!(object.kind(), Some(ErrorCode::Timeout));
        assert!(object.message.contains("1.5s"));
    }

    #[test]
    fn error_response_creation() {
        let error = McpError::InternalError {
            message: "test error".to_string(),
        };

        let response = error.to_response(Some(RequestId::from("test")));

        let object = response.error().expect("is an error response");
        assert_eq!(object.code, ErrorCode::InternalError.code());
        assert_eq!(object.message, "test error");
        assert!(response.result().is_none());
    }

    #[test]
    fn untyped_failures_become_internal_errors() {
        let response = error_response(&anyhow!("disk on fire"), Some(RequestId::from(7_i64)));

        let object = response.error().expect("is an error response");
        assert_eq!(object.code, -32603);
        assert!(object.message.contains("disk on fire"));
        assert_eq!(response.id, Some(RequestId::Number(7)));
    }

    #[test]
    fn typed_failures_keep_their_code() {
        let failure = anyhow::Error::new(McpError::InvalidParameters {
            message: "arguments must be an object".to_string(),
        });
        let response = error_response(&failure, None);

        assert_eq!(
            response.error().map(|e| e.code),
            Some(ErrorCode::InvalidParams.code())
        );
    }
}
