//! Model Context Protocol (MCP) engine
//!
//! JSON-RPC framing, session lifecycle, the tool and resource registry, and
//! method routing.

pub mod registry;
pub mod rpc;
pub mod schema;
pub mod server;
pub mod session;
pub mod uri_template;
