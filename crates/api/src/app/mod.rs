//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `config.rs`: environment configuration
//! - `services.rs`: store wiring (in-memory or Postgres + Redis)
//! - `routes/`: HTTP routes + handlers (bridge protocol, internal API, health)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod config;
pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use config::AppConfig;
pub use services::{AppServices, ServicesError};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> Result<Router, ServicesError> {
    let services = services::build_services(config).await?;
    Ok(build_router(config, services))
}

/// Router over already-built services.
pub fn build_router(config: &AppConfig, services: AppServices) -> Router {
    let services = Arc::new(services);

    let bridge = routes::bridge::router().layer(axum::middleware::from_fn_with_state(
        services.clone(),
        middleware::bridge_auth_middleware,
    ));

    let internal_auth = middleware::InternalAuthState {
        api_key: config.internal_api_key.as_deref().map(Arc::from),
    };
    let internal = routes::internal::router().layer(axum::middleware::from_fn_with_state(
        internal_auth,
        middleware::internal_auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api/fiscal-bridge", bridge)
        .nest("/internal", internal)
        .layer(Extension(services))
        .layer(ServiceBuilder::new())
}
