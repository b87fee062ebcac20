//! Collaborator-facing types for tools and resources
//!
//! Descriptors, handler traits and handler outputs that extensions use to plug
//! their business logic into the engine.

pub mod context;
pub mod resources;
pub mod tools;
