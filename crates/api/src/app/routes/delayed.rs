use axum::{
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Response,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use taskroute_core::RedeliveryGuard;

use crate::app::dto::Payload;
use crate::app::errors::json_error;
use crate::app::services::FAIL_TWICE_MAX_RETRIES;
use crate::context::DeliveryContext;
use crate::middleware;

pub fn router() -> Router {
    Router::new().route("/hello", post(hello)).route(
        "/fail_twice",
        post(fail_twice).route_layer(from_fn_with_state(
            RedeliveryGuard::new(FAIL_TWICE_MAX_RETRIES),
            middleware::max_retries,
        )),
    )
}

pub async fn hello(delivery: DeliveryContext, body: Option<Json<Payload>>) -> Json<Value> {
    let p = body.map(|Json(p)| p).unwrap_or_default();
    let message = format!("Hello task ran with payload: {}", p.message);
    tracing::info!(
        retry_count = delivery.metadata().retry_count,
        task = %delivery.metadata().task_name,
        "{message}"
    );
    Json(json!({ "message": message }))
}

/// Always fails; the retry guard acknowledges it after two retries.
pub async fn fail_twice(delivery: DeliveryContext) -> Response {
    tracing::error!(
        retry_count = delivery.metadata().retry_count,
        task = %delivery.metadata().task_name,
        "fail_twice handler failed"
    );
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "task_failed", "nooo")
}
