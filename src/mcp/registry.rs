//! Tool, resource template and resource list registry
//!
//! Registration is expected during extension setup but is allowed at any time;
//! every accessor takes the lock only for the metadata lookup and hands out
//! `Arc`s so that handlers run without any registry lock held.
//!
//! Duplicate registrations are rejected: tools by name, templates by
//! `uri_template`, resource lists by prefix. Listing order is registration
//! order.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::domain::resources::{
    ResourceHandler, ResourceListHandler, ResourceTemplateDescriptor,
};
use crate::domain::tools::{ToolDescriptor, ToolHandler};
use crate::errors::{McpError, RegistryError};
use crate::mcp::uri_template::{UriTemplate, UriVariables};

pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    pub handler: Arc<dyn ToolHandler>,
}

pub struct RegisteredTemplate {
    pub descriptor: ResourceTemplateDescriptor,
    pub template: UriTemplate,
    pub handler: Arc<dyn ResourceHandler>,
}

pub struct RegisteredResourceList {
    pub uri_prefix: String,
    pub handler: Arc<dyn ResourceListHandler>,
}

pub struct ResourceMatch {
    pub template: Arc<RegisteredTemplate>,
    pub variables: UriVariables,
}

#[derive(Default)]
struct Tables {
    tools: Vec<Arc<RegisteredTool>>,
    tool_index: HashMap<String, usize>,
    templates: Vec<Arc<RegisteredTemplate>>,
    resource_lists: Vec<Arc<RegisteredResourceList>>,
}

#[derive(Default)]
pub struct Registry {
    tables: RwLock<Tables>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tool(
        &self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RegistryError> {
        if descriptor.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if !matches!(descriptor.input_schema, Value::Object(_)) {
            return Err(RegistryError::InvalidInputSchema(descriptor.name));
        }

        let mut tables = self.tables.write();
        if tables.tool_index.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateTool(descriptor.name));
        }

        let position = tables.tools.len();
        tables.tool_index.insert(descriptor.name.clone(), position);
        tables
            .tools
            .push(Arc::new(RegisteredTool { descriptor, handler }));
        Ok(())
    }

    pub fn register_resource_template(
        &self,
        descriptor: ResourceTemplateDescriptor,
        handler: Arc<dyn ResourceHandler>,
    ) -> Result<(), RegistryError> {
        let template = UriTemplate::parse(&descriptor.uri_template).map_err(|source| {
            RegistryError::InvalidTemplate {
                template: descriptor.uri_template.clone(),
                source,
            }
        })?;

        if !template.literal_prefix().starts_with(&descriptor.uri_prefix) {
            return Err(RegistryError::PrefixMismatch {
                prefix: descriptor.uri_prefix,
                template: descriptor.uri_template,
            });
        }

        let mut tables = self.tables.write();
        if tables
            .templates
            .iter()
            .any(|existing| existing.descriptor.uri_template == descriptor.uri_template)
        {
            return Err(RegistryError::DuplicateResourceTemplate(
                descriptor.uri_template,
            ));
        }

        tables.templates.push(Arc::new(RegisteredTemplate {
            descriptor,
            template,
            handler,
        }));
        Ok(())
    }

    pub fn register_resource_list(
        &self,
        uri_prefix: impl Into<String>,
        handler: Arc<dyn ResourceListHandler>,
    ) -> Result<(), RegistryError> {
        let uri_prefix = uri_prefix.into();

        let mut tables = self.tables.write();
        if tables
            .resource_lists
            .iter()
            .any(|existing| existing.uri_prefix == uri_prefix)
        {
            return Err(RegistryError::DuplicateResourceList(uri_prefix));
        }

        tables
            .resource_lists
            .push(Arc::new(RegisteredResourceList { uri_prefix, handler }));
        Ok(())
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.tables
            .read()
            .tools
            .iter()
            .map(|tool| tool.descriptor.clone())
            .collect()
    }

    pub fn list_resource_templates(&self) -> Vec<ResourceTemplateDescriptor> {
        self.tables
            .read()
            .templates
            .iter()
            .map(|template| template.descriptor.clone())
            .collect()
    }

    pub fn resource_lists(&self) -> Vec<Arc<RegisteredResourceList>> {
        self.tables.read().resource_lists.clone()
    }

    pub fn tool_count(&self) -> usize {
        self.tables.read().tools.len()
    }

    pub fn get_tool(&self, name: &str) -> Result<Arc<RegisteredTool>, McpError> {
        let tables = self.tables.read();
        tables
            .tool_index
            .get(name)
            .and_then(|position| tables.tools.get(*position))
            .cloned()
            .ok_or_else(|| McpError::ToolNotFound(name.to_string()))
    }

    /// First template, in registration order, whose prefix and full pattern
    /// both match `uri`.
    pub fn find_resource_handler(&self, uri: &str) -> Result<ResourceMatch, McpError> {
        let tables = self.tables.read();
        tables
            .templates
            .iter()
            .filter(|candidate| uri.starts_with(&candidate.descriptor.uri_prefix))
            .find_map(|candidate| {
                candidate
                    .template
                    .matches(uri)
                    .map(|variables| ResourceMatch {
                        template: Arc::clone(candidate),
                        variables,
                    })
            })
            .ok_or_else(|| McpError::ResourceNotFound(uri.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Map};

    use super::*;
    use crate::domain::context::RequestContext;
    use crate::domain::resources::ResourceContents;
    use crate::domain::tools::ToolOutput;
    use crate::errors::HandlerError;

    struct NoopTool;

    #[async_trait]
    impl ToolHandler for NoopTool {
        async fn call(
            &self,
            _ctx: &RequestContext,
            _arguments: Map<String, Value>,
        ) -> Result<ToolOutput, HandlerError> {
            Ok(ToolOutput::from("ok"))
        }
    }

    struct NoopResource;

    #[async_trait]
    impl ResourceHandler for NoopResource {
        async fn read(
            &self,
            _ctx: &RequestContext,
            _uri: &str,
            _variables: &UriVariables,
        ) -> Result<Option<ResourceContents>, HandlerError> {
            Ok(None)
        }
    }

    struct NoopList;

    #[async_trait]
    impl ResourceListHandler for NoopList {
        async fn list(
            &self,
            _ctx: &RequestContext,
        ) -> Result<Vec<crate::domain::resources::ResourceEntry>, HandlerError> {
            Ok(vec![])
        }
    }

    fn template(prefix: &str, uri_template: &str, name: &str) -> ResourceTemplateDescriptor {
        ResourceTemplateDescriptor::new(prefix, uri_template, name)
    }

    #[test]
    fn lists_tools_in_registration_order() {
        let registry = Registry::new();
        for name in ["create_or_update_note", "delete_note", "list_notes", "read_note"] {
            registry
                .register_tool(ToolDescriptor::new(name), Arc::new(NoopTool))
                .expect("unique tool registers");
        }

        let names: Vec<String> = registry
            .list_tools()
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        assert_eq!(
            names,
            ["create_or_update_note", "delete_note", "list_notes", "read_note"]
        );
        assert_eq!(registry.list_tools(), registry.list_tools());
    }

    #[test]
    fn duplicate_tool_is_rejected_and_original_kept() {
        let registry = Registry::new();
        registry
            .register_tool(
                ToolDescriptor::new("read_note").with_title("first"),
                Arc::new(NoopTool),
            )
            .expect("first registration");

        let error = registry
            .register_tool(
                ToolDescriptor::new("read_note").with_title("second"),
                Arc::new(NoopTool),
            )
            .expect_err("duplicate must be rejected");

        assert_eq!(error, RegistryError::DuplicateTool("read_note".to_string()));
        assert_eq!(registry.tool_count(), 1);
        let kept = registry.get_tool("read_note").expect("tool present");
        assert_eq!(kept.descriptor.title.as_deref(), Some("first"));
    }

    #[test]
    fn rejects_empty_name_and_non_object_schema() {
        let registry = Registry::new();

        assert_eq!(
            registry
                .register_tool(ToolDescriptor::new("  "), Arc::new(NoopTool))
                .expect_err("empty name"),
            RegistryError::EmptyName
        );
        assert_eq!(
            registry
                .register_tool(
                    ToolDescriptor::new("bad").with_input_schema(json!("string")),
                    Arc::new(NoopTool),
                )
                .expect_err("schema must be an object"),
            RegistryError::InvalidInputSchema("bad".to_string())
        );
    }

    #[test]
    fn unknown_tool_is_not_found() {
        let registry = Registry::new();
        let error = registry.get_tool("missing").err().expect("missing tool");
        assert!(matches!(error, McpError::ToolNotFound(name) if name == "missing"));
    }

    #[test]
    fn first_registered_template_wins() {
        let registry = Registry::new();
        registry
            .register_resource_template(
                template("note://", "note://{id}", "single"),
                Arc::new(NoopResource),
            )
            .expect("first template");
        registry
            .register_resource_template(
                template("note://", "note://{path*}", "nested"),
                Arc::new(NoopResource),
            )
            .expect("second template");

        let single = registry
            .find_resource_handler("note://abc")
            .expect("single segment matches");
        assert_eq!(single.template.descriptor.name, "single");
        assert_eq!(single.variables.get("id").map(String::as_str), Some("abc"));

        let nested = registry
            .find_resource_handler("note://a/b/c")
            .expect("nested path matches");
        assert_eq!(nested.template.descriptor.name, "nested");
        assert_eq!(
            nested.variables.get("path").map(String::as_str),
            Some("a/b/c")
        );
    }

    #[test]
    fn prefix_filter_skips_other_schemes() {
        let registry = Registry::new();
        registry
            .register_resource_template(
                template("img://", "img://{name}", "pictures"),
                Arc::new(NoopResource),
            )
            .expect("template registers");

        let error = registry
            .find_resource_handler("note://abc")
            .err()
            .expect("no template for scheme");
        assert!(matches!(error, McpError::ResourceNotFound(uri) if uri == "note://abc"));
    }

    #[test]
    fn template_registration_is_validated() {
        let registry = Registry::new();

        let mismatch = registry
            .register_resource_template(
                template("img://", "note://{id}", "wrong"),
                Arc::new(NoopResource),
            )
            .expect_err("prefix must lead the template");
        assert!(matches!(mismatch, RegistryError::PrefixMismatch { .. }));

        let malformed = registry
            .register_resource_template(
                template("note://", "note://{id", "broken"),
                Arc::new(NoopResource),
            )
            .expect_err("malformed template");
        assert!(matches!(malformed, RegistryError::InvalidTemplate { .. }));

        registry
            .register_resource_template(
                template("note://", "note://{id}", "ok"),
                Arc::new(NoopResource),
            )
            .expect("valid template");
        let duplicate = registry
            .register_resource_template(
                template("note://", "note://{id}", "again"),
                Arc::new(NoopResource),
            )
            .expect_err("duplicate template");
        assert_eq!(
            duplicate,
            RegistryError::DuplicateResourceTemplate("note://{id}".to_string())
        );
        assert_eq!(registry.list_resource_templates().len(), 1);
    }

    #[test]
    fn duplicate_resource_list_prefix_is_rejected() {
        let registry = Registry::new();
        registry
            .register_resource_list("note://", Arc::new(NoopList))
            .expect("first list");

        let error = registry
            .register_resource_list("note://", Arc::new(NoopList))
            .expect_err("duplicate prefix");
        assert_eq!(
            error,
            RegistryError::DuplicateResourceList("note://".to_string())
        );
        assert_eq!(registry.resource_lists().len(), 1);
    }
}
