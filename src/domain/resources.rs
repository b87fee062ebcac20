//! Resource templates, resource list providers, and rendering of read results
//!
//! Templated resources are resolved by the URI matcher and read through a
//! [`ResourceHandler`]. Concrete resources are enumerated by
//! [`ResourceListHandler`]s registered per URI prefix.

use async_trait::async_trait;
use rust_mcp_sdk::schema::{
    BlobResourceContents, ReadResourceContent, ReadResourceResult, Resource,
    TextResourceContents,
};
use serde::Serialize;

use crate::domain::context::RequestContext;
use crate::errors::HandlerError;
use crate::mcp::uri_template::UriVariables;

/// `uri_prefix` is a cheap discriminator checked before the structural match
/// and is not part of the wire shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplateDescriptor {
    #[serde(skip)]
    pub uri_prefix: String,
    pub uri_template: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl ResourceTemplateDescriptor {
    pub fn new(
        uri_prefix: impl Into<String>,
        uri_template: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            uri_prefix: uri_prefix.into(),
            uri_template: uri_template.into(),
            name: name.into(),
            title: None,
            description: None,
            mime_type: None,
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

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceBody {
    Text(String),
    /// Base64-encoded bytes.
    Blob(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceContents {
    pub uri: Option<String>,
    pub mime_type: Option<String>,
    pub body: ResourceBody,
}

impl ResourceContents {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            uri: None,
            mime_type: None,
            body: ResourceBody::Text(text.into()),
        }
    }

    pub fn blob(base64: impl Into<String>) -> Self {
        Self {
            uri: None,
            mime_type: None,
            body: ResourceBody::Blob(base64.into()),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Reads a resource whose URI matched this handler's template.
    /// `Ok(None)` means the URI is well-formed but names nothing.
    async fn read(
        &self,
        ctx: &RequestContext,
        uri: &str,
        variables: &UriVariables,
    ) -> Result<Option<ResourceContents>, HandlerError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceEntry {
    pub uri: String,
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub mime_type: Option<String>,
}

#[async_trait]
pub trait ResourceListHandler: Send + Sync {
    async fn list(&self, ctx: &RequestContext) -> Result<Vec<ResourceEntry>, HandlerError>;
}

pub fn resource_entry_to_resource(entry: ResourceEntry) -> Resource {
    Resource {
        annotations: None,
        description: entry.description,
        icons: vec![],
        meta: None,
        mime_type: entry.mime_type,
        name: entry.name,
        size: None,
        title: entry.title,
        uri: entry.uri,
    }
}

/// Fills in the requested URI and the template's MIME type where the handler
/// left them unset.
pub fn contents_to_read_result(
    contents: ResourceContents,
    requested_uri: &str,
    default_mime_type: Option<&str>,
) -> ReadResourceResult {
    let uri = contents.uri.unwrap_or_else(|| requested_uri.to_string());
    let mime_type = contents
        .mime_type
        .or_else(|| default_mime_type.map(str::to_string));

    let content = match contents.body {
        ResourceBody::Text(text) => ReadResourceContent::from(TextResourceContents {
            meta: None,
            mime_type,
            text,
            uri,
        }),
        ResourceBody::Blob(blob) => ReadResourceContent::from(BlobResourceContents {
            blob,
            meta: None,
            mime_type,
            uri,
        }),
    };

    ReadResourceResult {
        contents: vec![content],
        meta: None,
    }
}
