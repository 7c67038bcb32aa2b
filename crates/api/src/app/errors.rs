use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use taskroute_infra::DispatchError;

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Conflict { task_name } => json_error(
            StatusCode::CONFLICT,
            "conflict",
            format!("task already exists: {task_name}"),
        ),
        e @ (DispatchError::InvalidCountdown { .. } | DispatchError::InvalidTaskId { .. }) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_options", e.to_string())
        }
        DispatchError::Materialize(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "materialize_error", e.to_string())
        }
        DispatchError::Sink(e) if e.is_retryable() => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "queue_unavailable", e.to_string())
        }
        DispatchError::Sink(e) => json_error(StatusCode::BAD_GATEWAY, "queue_error", e.to_string()),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskroute_core::MaterializeError;
    use taskroute_infra::SinkError;

    #[test]
    fn status_codes_follow_error_kind() {
        let conflict = DispatchError::Conflict { task_name: "t".into() };
        assert_eq!(dispatch_error_to_response(conflict).status(), StatusCode::CONFLICT);

        let missing = DispatchError::Materialize(MaterializeError::missing("p"));
        assert_eq!(
            dispatch_error_to_response(missing).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let timeout = DispatchError::Sink(SinkError::Timeout(std::time::Duration::from_secs(1)));
        assert_eq!(
            dispatch_error_to_response(timeout).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );

        let denied = DispatchError::Sink(SinkError::Auth("denied".into()));
        assert_eq!(dispatch_error_to_response(denied).status(), StatusCode::BAD_GATEWAY);

        let bad_id = DispatchError::InvalidTaskId { task_id: "a/b".into() };
        assert_eq!(dispatch_error_to_response(bad_id).status(), StatusCode::BAD_REQUEST);

        let far = DispatchError::InvalidCountdown { countdown: std::time::Duration::MAX };
        assert_eq!(dispatch_error_to_response(far).status(), StatusCode::BAD_REQUEST);
    }
}
