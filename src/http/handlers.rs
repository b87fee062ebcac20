//! Axum HTTP handlers for the web server
//!
//! Provides the Model Context Protocol endpoint with `Mcp-Session-Id` session
//! tracking, session termination, and general metadata endpoints.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::context::RequestContext;
use crate::errors::AppError;
use crate::mcp::rpc::{invalid_request, parse_error};
use crate::mcp::server::SUPPORTED_PROTOCOL_VERSIONS;
use crate::mcp::session::{Session, SessionPhase};
use crate::AppState;

pub const MCP_SESSION_HEADER: &str = "mcp-session-id";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: String,
    pub version: String,
    pub mcp_endpoint: &'static str,
    pub protocol_versions: &'static [&'static str],
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sessions: state.sessions.len(),
    })
}

pub async fn discovery(State(state): State<AppState>) -> Json<DiscoveryResponse> {
    let server_info = state.engine.server_info();
    Json(DiscoveryResponse {
        name: server_info.name.clone(),
        version: server_info.version.clone(),
        mcp_endpoint: "/mcp",
        protocol_versions: SUPPORTED_PROTOCOL_VERSIONS,
    })
}

pub async fn mcp_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let (session, known) = resolve_session(&state, &headers)?;

    // Cancelled when axum drops this future, e.g. on client disconnect.
    let disconnect = CancellationToken::new();
    let _disconnect_guard = disconnect.clone().drop_guard();
    let ctx = RequestContext::new()
        .with_session_id(session.shared_id())
        .with_headers(headers)
        .with_cancellation_token(disconnect);

    let response = match serde_json::from_slice::<Value>(&body) {
        Err(_) => (StatusCode::OK, Json(parse_error())).into_response(),
        Ok(Value::Array(batch)) if batch.is_empty() => (
            StatusCode::OK,
            Json(invalid_request(None, "batch must not be empty")),
        )
            .into_response(),
        Ok(Value::Array(batch)) => {
            let mut responses = Vec::new();
            for item in batch {
                if let Some(response) = state
                    .engine
                    .handle_json_rpc_value(&session, &ctx, item)
                    .await
                {
                    responses.push(response);
                }
            }

            if responses.is_empty() {
                StatusCode::NO_CONTENT.into_response()
            } else {
                (StatusCode::OK, Json(Value::Array(responses))).into_response()
            }
        }
        Ok(payload) => match state
            .engine
            .handle_json_rpc_value(&session, &ctx, payload)
            .await
        {
            Some(response) => (StatusCode::OK, Json(response)).into_response(),
            None => StatusCode::NO_CONTENT.into_response(),
        },
    };

    Ok(attach_session(&state, &session, known, response))
}

pub async fn delete_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let session_id = headers
        .get(MCP_SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(AppError::missing_session_id)?;

    let session = state
        .sessions
        .remove(session_id)
        .ok_or_else(AppError::session_not_found)?;

    info!(
        session = %session.id(),
        created_at = %session.created_at(),
        "mcp session terminated"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Looks up the session named by the header, or starts an unstored one.
fn resolve_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(Arc<Session>, bool), AppError> {
    let Some(value) = headers.get(MCP_SESSION_HEADER) else {
        return Ok((Session::new(), false));
    };

    value
        .to_str()
        .ok()
        .and_then(|session_id| state.sessions.get(session_id))
        .map(|session| (session, true))
        .ok_or_else(AppError::session_not_found)
}

/// A new session is only kept once it got past `Uninitialized`; clients learn
/// its id from the response header.
fn attach_session(
    state: &AppState,
    session: &Arc<Session>,
    known: bool,
    mut response: Response,
) -> Response {
    let started = session.phase() != SessionPhase::Uninitialized;
    if !known && started {
        state.sessions.insert(Arc::clone(session));
        debug!(session = %session.id(), "mcp session stored");
    }

    if known || started {
        if let Ok(value) = HeaderValue::from_str(session.id()) {
            response.headers_mut().insert(MCP_SESSION_HEADER, value);
        }
    }

    response
}
