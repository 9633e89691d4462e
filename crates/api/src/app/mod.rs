//! HTTP application wiring.
//!
//! - `routes/`: handlers, one file per area
//! - `dto.rs`: request bodies
//! - `errors.rs`: engine errors mapped to JSON error responses
//! - `worker.rs`: background migration loop

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use catbridge_infra::MigrationEngine;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod worker;

/// Build the full HTTP router around a loaded engine.
pub fn build_app(engine: Arc<MigrationEngine>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(ServiceBuilder::new().layer(Extension(engine)))
}
