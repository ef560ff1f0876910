//! HTTP API: bridge protocol, internal collaborator API, health.

pub mod app;
pub mod context;
pub mod middleware;
