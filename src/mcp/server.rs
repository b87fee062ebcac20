//! The central Model Context Protocol engine
//!
//! Provides JSON-RPC envelope handling, the initialize handshake gate, method
//! routing over the registry, tool argument validation and audit logging.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use rust_mcp_sdk::schema::{
    CallToolRequestParams, Implementation, InitializeResult, ListResourcesResult,
    ReadResourceRequestParams, ServerCapabilities, ServerCapabilitiesResources,
    ServerCapabilitiesTools,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::domain::context::RequestContext;
use crate::domain::resources::{
    contents_to_read_result, resource_entry_to_resource, ResourceHandler, ResourceListHandler,
    ResourceTemplateDescriptor,
};
use crate::domain::tools::{
    tool_error_to_result, tool_output_to_result, ToolDescriptor, ToolHandler,
};
use crate::errors::{HandlerError, McpError, RegistryError};
use crate::mcp::registry::Registry;
use crate::mcp::rpc::{json_rpc_result, mcp_error_to_json_rpc, parse_envelope, Incoming};
use crate::mcp::schema::validate_arguments;
use crate::mcp::session::Session;

/// Newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub instructions: Option<String>,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
        }
    }
}

pub struct McpEngine {
    registry: Registry,
    server_info: ServerInfo,
}

impl McpEngine {
    pub fn new(server_info: ServerInfo) -> Self {
        Self {
            registry: Registry::new(),
            server_info,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    pub fn add_tool<H>(&self, descriptor: ToolDescriptor, handler: H) -> Result<(), RegistryError>
    where
        H: ToolHandler + 'static,
    {
        let name = descriptor.name.clone();
        self.registry.register_tool(descriptor, Arc::new(handler))?;
        debug!(tool = %name, "tool registered");
        Ok(())
    }

    pub fn add_resource_template<H>(
        &self,
        descriptor: ResourceTemplateDescriptor,
        handler: H,
    ) -> Result<(), RegistryError>
    where
        H: ResourceHandler + 'static,
    {
        let uri_template = descriptor.uri_template.clone();
        self.registry
            .register_resource_template(descriptor, Arc::new(handler))?;
        debug!(uri_template = %uri_template, "resource template registered");
        Ok(())
    }

    pub fn add_resource_list<H>(
        &self,
        uri_prefix: impl Into<String>,
        handler: H,
    ) -> Result<(), RegistryError>
    where
        H: ResourceListHandler + 'static,
    {
        let uri_prefix = uri_prefix.into();
        self.registry
            .register_resource_list(uri_prefix.clone(), Arc::new(handler))?;
        debug!(uri_prefix = %uri_prefix, "resource list registered");
        Ok(())
    }

    /// Handles one JSON-RPC message. Returns `None` for notifications and for
    /// requests cancelled before they finished.
    pub async fn handle_json_rpc_value(
        &self,
        session: &Arc<Session>,
        ctx: &RequestContext,
        payload: Value,
    ) -> Option<Value> {
        match parse_envelope(payload) {
            Ok(Incoming::Request { id, method, params }) => {
                self.handle_request(session, ctx, id, method, params).await
            }
            Ok(Incoming::Notification { method, params }) => {
                self.handle_notification(session, &method, params.as_ref());
                None
            }
            Err(response) => response,
        }
    }

    pub async fn handle_request(
        &self,
        session: &Arc<Session>,
        ctx: &RequestContext,
        id: Value,
        method: String,
        params: Option<Value>,
    ) -> Option<Value> {
        let audit_params = redact_audit_params(params.as_ref());

        let guard = session.track_request(&id, ctx.cancellation_token());
        let request_ctx = ctx
            .clone()
            .with_session_id(session.shared_id())
            .with_cancellation_token(guard.token().clone());

        let outcome = tokio::select! {
            biased;
            _ = guard.cancelled() => Err(McpError::Cancelled),
            outcome = self.dispatch(session, &request_ctx, &method, params) => outcome,
        };
        drop(guard);

        let (response, label) = match outcome {
            Ok(result) => {
                let label = if result.get("isError") == Some(&Value::Bool(true)) {
                    "tool_error"
                } else {
                    "success"
                };
                (json_rpc_result(Some(id), result), label)
            }
            Err(McpError::Cancelled) => {
                info!(
                    method = %method,
                    session = %session.id(),
                    params = %audit_params,
                    outcome = "cancelled",
                    "mcp action audited"
                );
                return None;
            }
            Err(err) => (mcp_error_to_json_rpc(Some(id), &err), "failure"),
        };

        info!(
            method = %method,
            session = %session.id(),
            params = %audit_params,
            outcome = label,
            "mcp action audited"
        );

        Some(response)
    }

    pub fn handle_notification(&self, session: &Session, method: &str, params: Option<&Value>) {
        match method {
            "notifications/initialized" => session.acknowledge_initialized(),
            "notifications/cancelled" => {
                match params.and_then(|params| params.get("requestId")) {
                    Some(request_id) => {
                        let found = session.cancel_request(request_id);
                        debug!(
                            session = %session.id(),
                            request_id = %request_id,
                            found,
                            "cancellation requested"
                        );
                    }
                    None => debug!(session = %session.id(), "cancellation without requestId"),
                }
            }
            _ => debug!(method = %method, "notification ignored"),
        }
    }

    async fn dispatch(
        &self,
        session: &Arc<Session>,
        ctx: &RequestContext,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, McpError> {
        match method {
            "ping" => return Ok(json!({})),
            "initialize" => return self.initialize(session, params.as_ref()),
            _ => {}
        }

        session.admit()?;

        match method {
            "tools/list" => to_result(json!({ "tools": self.registry.list_tools() })),
            "tools/call" => self.call_tool(ctx, params).await,
            "resources/list" => self.list_resources(ctx).await,
            "resources/templates/list" => to_result(json!({
                "resourceTemplates": self.registry.list_resource_templates()
            })),
            "resources/read" => self.read_resource(ctx, params).await,
            _ => Err(McpError::MethodNotFound(method.to_string())),
        }
    }

    fn initialize(&self, session: &Session, params: Option<&Value>) -> Result<Value, McpError> {
        let params = params.and_then(Value::as_object);
        let offered_version = requested_protocol_version(params)?;
        let capabilities = params
            .and_then(|object| object.get("capabilities"))
            .cloned()
            .unwrap_or_else(|| json!({}));
        let client_info = params
            .and_then(|object| object.get("clientInfo"))
            .cloned()
            .unwrap_or(Value::Null);

        let handshake = session.begin_initialize(
            offered_version,
            SUPPORTED_PROTOCOL_VERSIONS,
            capabilities,
            client_info,
        )?;

        if handshake.fresh {
            info!(
                session = %session.id(),
                protocol_version = %handshake.protocol_version,
                client_info = %session.client_info(),
                "mcp session initialized"
            );
        }

        to_result(InitializeResult {
            server_info: Implementation {
                name: self.server_info.name.clone(),
                version: self.server_info.version.clone(),
                title: None,
                description: None,
                icons: vec![],
                website_url: None,
            },
            capabilities: ServerCapabilities {
                tools: Some(ServerCapabilitiesTools {
                    list_changed: Some(false),
                }),
                resources: Some(ServerCapabilitiesResources {
                    subscribe: Some(false),
                    list_changed: Some(false),
                }),
                prompts: None,
                ..Default::default()
            },
            protocol_version: handshake.protocol_version,
            instructions: self.server_info.instructions.clone(),
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        ctx: &RequestContext,
        params: Option<Value>,
    ) -> Result<Value, McpError> {
        let Some(raw_params) = params else {
            return Err(McpError::invalid_params(
                "missing_params",
                "tools/call params are required",
            ));
        };

        let tool_call: CallToolRequestParams = serde_json::from_value(raw_params).map_err(|_| {
            McpError::invalid_params("invalid_tool_call", "tools/call params must name a tool")
        })?;

        let tool = self.registry.get_tool(&tool_call.name)?;
        let arguments: Map<String, Value> = tool_call.arguments.unwrap_or_default();

        if let Err(violations) = validate_arguments(&tool.descriptor.input_schema, &arguments) {
            return Err(McpError::InvalidParams {
                code: "schema_violation",
                message: format!(
                    "arguments do not match the input schema of {}",
                    tool_call.name
                ),
                details: json!({
                    "tool": tool_call.name,
                    "violations": violations,
                }),
            });
        }

        let outcome = AssertUnwindSafe(tool.handler.call(ctx, arguments))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(output)) => tool_output_to_result(output)?,
            Ok(Err(err)) => {
                warn!(tool = %tool_call.name, error = %err, "tool handler failed");
                tool_error_to_result(&err)
            }
            Err(_) => {
                error!(tool = %tool_call.name, "tool handler panicked");
                tool_error_to_result(&HandlerError::new(format!(
                    "tool {} failed unexpectedly",
                    tool_call.name
                )))
            }
        };

        to_result(result)
    }

    async fn list_resources(&self, ctx: &RequestContext) -> Result<Value, McpError> {
        let mut resources = Vec::new();

        for list in self.registry.resource_lists() {
            let entries = AssertUnwindSafe(list.handler.list(ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    error!(uri_prefix = %list.uri_prefix, "resource list handler panicked");
                    Err(HandlerError::new("resource list handler failed unexpectedly"))
                })
                .map_err(|err| McpError::Internal {
                    code: "resource_list_failed",
                    message: err.to_string(),
                    details: json!({ "uriPrefix": list.uri_prefix }),
                })?;
            resources.extend(entries.into_iter().map(resource_entry_to_resource));
        }

        to_result(ListResourcesResult {
            meta: None,
            next_cursor: None,
            resources,
        })
    }

    async fn read_resource(
        &self,
        ctx: &RequestContext,
        params: Option<Value>,
    ) -> Result<Value, McpError> {
        let Some(raw_params) = params else {
            return Err(McpError::invalid_params(
                "missing_params",
                "resources/read params are required",
            ));
        };

        let resource_read: ReadResourceRequestParams = serde_json::from_value(raw_params)
            .map_err(|_| {
                McpError::invalid_params("invalid_resource_read", "resources/read requires a uri")
            })?;
        let uri = resource_read.uri;

        let matched = self.registry.find_resource_handler(&uri)?;
        let read = matched.template.handler.read(ctx, &uri, &matched.variables);
        let contents = AssertUnwindSafe(read)
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                error!(uri = %uri, "resource handler panicked");
                Err(HandlerError::new("resource handler failed unexpectedly"))
            })
            .map_err(|err| McpError::Internal {
                code: "resource_read_failed",
                message: err.to_string(),
                details: json!({ "uri": uri }),
            })?;

        let Some(contents) = contents else {
            warn!(uri = %uri, "resource not found by handler");
            return Err(McpError::ResourceNotFound(uri));
        };

        to_result(contents_to_read_result(
            contents,
            &uri,
            matched.template.descriptor.mime_type.as_deref(),
        ))
    }
}

fn to_result<T: Serialize>(result: T) -> Result<Value, McpError> {
    serde_json::to_value(result)
        .map_err(|err| McpError::internal("result_serialization", err.to_string()))
}

pub fn requested_protocol_version(params: Option<&Map<String, Value>>) -> Result<&str, McpError> {
    params
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .ok_or_else(|| {
            McpError::invalid_params(
                "invalid_protocol_version",
                "initialize params.protocolVersion is required",
            )
        })
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "credentials" | "credential" | "api_key" | "apikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}
