use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::mcp::uri_template::UriTemplateError;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Server-defined codes, stable across releases.
pub const NOT_INITIALIZED: i32 = -32000;
pub const TOOL_NOT_FOUND: i32 = -32001;
pub const RESOURCE_NOT_FOUND: i32 = -32002;

/// Protocol-level failures of a single JSON-RPC request.
///
/// Every variant maps to exactly one JSON-RPC error code. Tool execution
/// failures are deliberately absent: they travel inside a successful
/// `tools/call` result with `isError: true`.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("parse error")]
    Parse,
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {message}")]
    InvalidParams {
        code: &'static str,
        message: String,
        details: Value,
    },
    #[error("session not initialized")]
    NotInitialized,
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    #[error("resource not found: {0}")]
    ResourceNotFound(String),
    #[error("internal error: {message}")]
    Internal {
        code: &'static str,
        message: String,
        details: Value,
    },
    #[error("request cancelled")]
    Cancelled,
}

impl McpError {
    pub fn invalid_params(code: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParams {
            code,
            message: message.into(),
            details: json!({}),
        }
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::Internal {
            code,
            message: message.into(),
            details: json!({}),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Parse => PARSE_ERROR,
            Self::InvalidRequest(_) => INVALID_REQUEST,
            Self::MethodNotFound(_) => METHOD_NOT_FOUND,
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::NotInitialized => NOT_INITIALIZED,
            Self::ToolNotFound(_) => TOOL_NOT_FOUND,
            Self::ResourceNotFound(_) => RESOURCE_NOT_FOUND,
            Self::Internal { .. } | Self::Cancelled => INTERNAL_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Parse => "Parse error",
            Self::InvalidRequest(_) => "Invalid Request",
            Self::MethodNotFound(_) => "Method not found",
            Self::InvalidParams { .. } => "Invalid params",
            Self::NotInitialized => "Session not initialized",
            Self::ToolNotFound(_) => "Tool not found",
            Self::ResourceNotFound(_) => "Resource not found",
            Self::Internal { .. } => "Internal error",
            Self::Cancelled => "Request cancelled",
        }
    }

    /// Structured `error.data` payload, `None` for the bare standard errors.
    pub fn data(&self) -> Option<Value> {
        match self {
            Self::Parse | Self::MethodNotFound(_) | Self::Cancelled => None,
            Self::InvalidRequest(reason) => Some(error_data("invalid_request", reason, json!({}))),
            Self::InvalidParams {
                code,
                message,
                details,
            }
            | Self::Internal {
                code,
                message,
                details,
            } => Some(error_data(code, message, details.clone())),
            Self::NotInitialized => Some(error_data(
                "not_initialized",
                "initialize must complete before this method",
                json!({}),
            )),
            Self::ToolNotFound(name) => Some(error_data(
                "tool_not_found",
                "unknown tool name",
                json!({ "name": name }),
            )),
            Self::ResourceNotFound(uri) => Some(error_data(
                "resource_not_found",
                "unknown resource uri",
                json!({ "uri": uri }),
            )),
        }
    }
}

fn error_data(code: &str, message: &str, details: Value) -> Value {
    json!({
        "code": code,
        "message": message,
        "details": details,
    })
}

/// Rejected registrations. Duplicates are never replaced.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool name must not be empty")]
    EmptyName,
    #[error("tool {0} is already registered")]
    DuplicateTool(String),
    #[error("resource template {0} is already registered")]
    DuplicateResourceTemplate(String),
    #[error("resource list for prefix {0} is already registered")]
    DuplicateResourceList(String),
    #[error("input schema of tool {0} must be a JSON object")]
    InvalidInputSchema(String),
    #[error("invalid uri template {template}: {source}")]
    InvalidTemplate {
        template: String,
        #[source]
        source: UriTemplateError,
    },
    #[error("uri prefix {prefix} is not a literal prefix of {template}")]
    PrefixMismatch { prefix: String, template: String },
}

/// Failure reported by a collaborator's tool or resource handler.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Transport-level failures answered with a plain HTTP status.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {message}")]
    BadRequest {
        code: &'static str,
        message: &'static str,
    },
    #[error("not found: {message}")]
    NotFound {
        code: &'static str,
        message: &'static str,
    },
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl AppError {
    pub fn missing_session_id() -> Self {
        Self::BadRequest {
            code: "missing_session_id",
            message: "Mcp-Session-Id header is required",
        }
    }

    pub fn session_not_found() -> Self {
        Self::NotFound {
            code: "session_not_found",
            message: "unknown or expired mcp session",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, code, message.to_string())
            }
            Self::NotFound { code, message } => (StatusCode::NOT_FOUND, code, message.to_string()),
        };

        (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                message,
                details: json!({}),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defined_codes_are_distinct() {
        let codes = [
            McpError::NotInitialized.code(),
            McpError::ToolNotFound("a".to_string()).code(),
            McpError::ResourceNotFound("a://b".to_string()).code(),
        ];

        assert_eq!(codes, [-32000, -32001, -32002]);
    }

    #[test]
    fn tool_not_found_data_names_the_tool() {
        let data = McpError::ToolNotFound("missing".to_string())
            .data()
            .expect("tool not found carries data");

        assert_eq!(data["code"], "tool_not_found");
        assert_eq!(data["details"]["name"], "missing");
    }

    #[test]
    fn method_not_found_has_no_data() {
        let error = McpError::MethodNotFound("nope".to_string());
        assert_eq!(error.code(), METHOD_NOT_FOUND);
        assert_eq!(error.message(), "Method not found");
        assert!(error.data().is_none());
    }

    #[test]
    fn invalid_params_keeps_details() {
        let error = McpError::InvalidParams {
            code: "schema_violation",
            message: "arguments do not match".to_string(),
            details: json!({ "violations": [] }),
        };

        let data = error.data().expect("invalid params carries data");
        assert_eq!(error.code(), INVALID_PARAMS);
        assert_eq!(data["code"], "schema_violation");
        assert!(data["details"]["violations"].is_array());
    }
}
