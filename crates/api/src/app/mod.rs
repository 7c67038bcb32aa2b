//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: sinks, hooks and the bound task routes
//! - `routes/`: front routes that enqueue work, and the delivered handlers
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;
use uuid::Uuid;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Shared state of the front routes.
#[derive(Debug, Clone)]
pub struct AppState {
    pub handlers: services::Handlers,
    /// Task id reused by `/deduped` for the lifetime of the process.
    pub dedup_task_id: String,
}

impl AppState {
    pub fn new(handlers: services::Handlers) -> Self {
        Self {
            handlers,
            dedup_task_id: Uuid::now_v7().to_string(),
        }
    }
}

/// Path under which delivered requests arrive, taken from the base URL.
pub fn listener_prefix(base_url: &str) -> String {
    url::Url::parse(base_url)
        .map(|u| u.path().trim_end_matches('/').to_string())
        .unwrap_or_default()
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// Delivered handlers are nested under `listener_prefix` so front routes
/// and the listener can share one process.
pub fn build_app(state: AppState, listener_prefix: &str) -> Router {
    let front = Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router());

    let prefix = listener_prefix.trim_end_matches('/');
    let app = if prefix.is_empty() {
        front.merge(routes::listener())
    } else {
        front.nest(prefix, routes::listener())
    };

    app.layer(ServiceBuilder::new().layer(Extension(Arc::new(state))))
}
