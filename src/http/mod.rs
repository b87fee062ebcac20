//! HTTP Transport layer for the Model Context Protocol
//!
//! Provides the external API routing, including the `/mcp` endpoint and the
//! metadata endpoints.

pub mod handlers;
