use axum::{routing::get, Router};

pub mod delayed;
pub mod front;
pub mod scheduled;
pub mod system;

/// Front routes: each one enqueues work for a delivered handler.
pub fn router() -> Router {
    Router::new()
        .route("/basic", get(front::basic))
        .route("/with_countdown", get(front::with_countdown))
        .route("/deduped", get(front::deduped))
        .route("/fail", get(front::fail))
}

/// Handlers the queue and the scheduler deliver to.
pub fn listener() -> Router {
    Router::new()
        .nest("/delayed", delayed::router())
        .nest("/scheduled", scheduled::router())
}
