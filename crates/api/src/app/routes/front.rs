use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use taskroute_core::CallArgs;
use taskroute_infra::{Delayer, DispatchError};

use crate::app::dto::Payload;
use crate::app::errors;
use crate::app::AppState;

pub async fn basic(Extension(state): Extension<Arc<AppState>>) -> Response {
    enqueue_hello(state.handlers.hello.options(), "Basic task", "Basic hello task scheduled").await
}

pub async fn with_countdown(Extension(state): Extension<Arc<AppState>>) -> Response {
    let delayer = state.handlers.hello.options().countdown(Duration::from_secs(5));
    enqueue_hello(delayer, "Countdown task", "Countdown hello task scheduled").await
}

/// Same task id every time: only the first call per process succeeds.
pub async fn deduped(Extension(state): Extension<Arc<AppState>>) -> Response {
    let delayer = state.handlers.hello.options().task_id(&state.dedup_task_id);
    enqueue_hello(delayer, "Deduped task", "Deduped hello task scheduled").await
}

pub async fn fail(Extension(state): Extension<Arc<AppState>>) -> Response {
    match state.handlers.fail_twice.delay(&CallArgs::new()).await {
        Ok(task) => (
            StatusCode::OK,
            Json(json!({
                "message": "The triggered task will fail twice and then be marked done automatically",
                "task": task.name,
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn enqueue_hello(delayer: Delayer, message: &str, scheduled: &str) -> Response {
    let args = match CallArgs::new().with_json("p", &Payload::new(message)) {
        Ok(args) => args,
        Err(e) => return errors::dispatch_error_to_response(DispatchError::from(e)),
    };

    match delayer.delay(&args).await {
        Ok(task) => (StatusCode::OK, Json(json!({ "message": scheduled, "task": task.name }))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
