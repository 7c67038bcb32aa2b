use axum::{routing::post, Json, Router};
use serde_json::{json, Value};

use crate::app::dto::Payload;
use crate::context::DeliveryContext;

pub fn router() -> Router {
    Router::new().route("/timed_hello", post(timed_hello))
}

pub async fn timed_hello(delivery: DeliveryContext, body: Option<Json<Payload>>) -> Json<Value> {
    let p = body.map(|Json(p)| p).unwrap_or_default();
    let message = format!("Scheduled hello task ran with payload: {}", p.message);
    tracing::info!(previous_response = delivery.metadata().previous_response, "{message}");
    Json(json!({ "message": message }))
}
