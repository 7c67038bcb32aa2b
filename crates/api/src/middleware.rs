use axum::{
    extract::State,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use taskroute_core::delivery::MAX_RETRIES_EXHAUSTED;
use taskroute_core::{GuardDecision, RedeliveryGuard};

use crate::context::DeliveryContext;

/// Acknowledge deliveries past the retry ceiling without running the handler.
///
/// The queue only stops redelivering on a 2xx, so an exhausted task is
/// answered with `200` and logged as a failure.
pub async fn max_retries(
    State(guard): State<RedeliveryGuard>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let delivery = DeliveryContext::from_headers(req.headers());

    match guard.check(delivery.metadata()) {
        GuardDecision::Proceed => next.run(req).await,
        GuardDecision::Stop { retry_count, ceiling } => {
            tracing::warn!(
                task = %delivery.metadata().task_name,
                path = %req.uri().path(),
                retry_count,
                ceiling,
                "max retries exhausted; acknowledging delivery"
            );
            (StatusCode::OK, Json(json!({ "detail": MAX_RETRIES_EXHAUSTED }))).into_response()
        }
    }
}
