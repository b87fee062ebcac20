//! Tool descriptors, the handler seam, and rendering of handler output
//!
//! A tool is registered as a [`ToolDescriptor`] plus an `Arc<dyn ToolHandler>`.
//! Handler output is rendered into an MCP `CallToolResult`; handler failures
//! are rendered into the same shape with `isError: true`.

use async_trait::async_trait;
use rust_mcp_sdk::schema::{CallToolResult, ContentBlock, TextContent};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::domain::context::RequestContext;
use crate::errors::{HandlerError, McpError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Descriptor accepting an object with no declared properties.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            input_schema: json!({ "type": "object", "properties": {} }),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_input_schema(mut self, input_schema: Value) -> Self {
        self.input_schema = input_schema;
        self
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs the tool with arguments that already passed structural validation.
    async fn call(
        &self,
        ctx: &RequestContext,
        arguments: Map<String, Value>,
    ) -> Result<ToolOutput, HandlerError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLink {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    /// Rendered as JSON text; objects are also exposed as `structuredContent`.
    Json(Value),
    ResourceLinks(Vec<ResourceLink>),
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<ResourceLink> for ToolOutput {
    fn from(link: ResourceLink) -> Self {
        Self::ResourceLinks(vec![link])
    }
}

impl From<Vec<ResourceLink>> for ToolOutput {
    fn from(links: Vec<ResourceLink>) -> Self {
        Self::ResourceLinks(links)
    }
}

pub fn tool_output_to_result(output: ToolOutput) -> Result<CallToolResult, McpError> {
    let (content, structured_content) = match output {
        ToolOutput::Text(text) => (vec![text_block(text)], None),
        ToolOutput::Json(value) => {
            let text = serde_json::to_string(&value)
                .map_err(|err| McpError::internal("tool_output_serialization", err.to_string()))?;
            let structured = match value {
                Value::Object(map) => Some(map),
                _ => None,
            };
            (vec![text_block(text)], structured)
        }
        ToolOutput::ResourceLinks(links) => (
            links
                .into_iter()
                .map(resource_link_block)
                .collect::<Result<Vec<_>, _>>()?,
            None,
        ),
    };

    Ok(CallToolResult {
        content,
        is_error: Some(false),
        meta: None,
        structured_content,
    })
}

/// Tool failure reported inside a successful JSON-RPC envelope.
pub fn tool_error_to_result(err: &HandlerError) -> CallToolResult {
    CallToolResult {
        content: vec![text_block(err.message().to_string())],
        is_error: Some(true),
        meta: None,
        structured_content: None,
    }
}

fn text_block(text: String) -> ContentBlock {
    ContentBlock::from(TextContent::new(text, None, None))
}

fn resource_link_block(link: ResourceLink) -> Result<ContentBlock, McpError> {
    let mut value = serde_json::to_value(&link)
        .map_err(|err| McpError::internal("tool_output_serialization", err.to_string()))?;
    if let Value::Object(map) = &mut value {
        map.insert("type".to_string(), Value::String("resource_link".to_string()));
    }

    serde_json::from_value(value)
        .map_err(|err| McpError::internal("tool_output_serialization", err.to_string()))
}
