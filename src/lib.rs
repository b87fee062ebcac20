use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;

use mcp::server::McpEngine;
use mcp::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<McpEngine>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(engine: Arc<McpEngine>, sessions: Arc<SessionStore>) -> Self {
        Self { engine, sessions }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .route(
            "/mcp",
            post(http::handlers::mcp_endpoint).delete(http::handlers::delete_session),
        )
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
