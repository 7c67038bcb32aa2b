//! REST sinks against a local mock of the two Google APIs.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use taskroute_core::{HttpMethod, LocationPath, MaterializedRequest, QueuePath};
use taskroute_infra::envelope::{CreateJobRequest, CreateTaskRequest, HttpTarget, Job};
use taskroute_infra::rest::{CloudSchedulerClient, CloudTasksClient, NoAuth, StaticToken};
use taskroute_infra::{SchedulerSink, SinkError, TaskSink};

const TIMEOUT: Duration = Duration::from_secs(5);
const KNOWN_JOB: &str = "projects/p/locations/l/jobs/known";

#[derive(Debug, Clone)]
struct Seen {
    method: Method,
    path: String,
    auth: Option<String>,
    body: Value,
}

#[derive(Clone, Default)]
struct Mock {
    seen: Arc<Mutex<Vec<Seen>>>,
}

fn api_error(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(json!({"error": {"code": status.as_u16(), "message": message}}))).into_response()
}

fn known_job() -> Value {
    json!({
        "name": KNOWN_JOB,
        "schedule": "* * * * *",
        "timeZone": "UTC",
        "httpTarget": {"uri": "http://listener/tick", "httpMethod": "POST"},
        "state": "ENABLED",
        "userUpdateTime": "2024-01-01T00:00:00Z"
    })
}

async fn handle(State(mock): State<Mock>, method: Method, uri: Uri, headers: HeaderMap, body: String) -> Response {
    let path = uri.path().to_string();
    let body: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    mock.seen.lock().unwrap().push(Seen {
        method: method.clone(),
        path: path.clone(),
        auth,
        body: body.clone(),
    });

    let job_path = format!("/v1/{KNOWN_JOB}");
    match (method, path.as_str()) {
        (Method::POST, p) if p.starts_with("/v2/") && p.ends_with("/tasks") => {
            let mut task = body["task"].clone();
            match task["name"].as_str() {
                Some(name) if name.ends_with("/tasks/dup") => api_error(StatusCode::CONFLICT, "task exists"),
                Some(_) => axum::Json(task).into_response(),
                None => {
                    let parent = p.trim_start_matches("/v2/").trim_end_matches("/tasks");
                    task["name"] = json!(format!("{parent}/tasks/generated"));
                    axum::Json(task).into_response()
                }
            }
        }
        (Method::GET, p) if p == job_path => axum::Json(known_job()).into_response(),
        (Method::DELETE, p) if p == job_path => axum::Json(json!({})).into_response(),
        (Method::GET | Method::DELETE, _) => api_error(StatusCode::NOT_FOUND, "job not found"),
        (Method::POST, p) if p.ends_with("/jobs") => {
            if body["schedule"] == "invalid" {
                return api_error(StatusCode::BAD_REQUEST, "bad schedule");
            }
            let mut job = body;
            job["state"] = json!("ENABLED");
            axum::Json(job).into_response()
        }
        _ => api_error(StatusCode::INTERNAL_SERVER_ERROR, "unexpected call"),
    }
}

struct MockServer {
    endpoint: String,
    mock: Mock,
    handle: tokio::task::JoinHandle<()>,
}

impl MockServer {
    async fn start() -> Self {
        let mock = Mock::default();
        let app = Router::new().fallback(handle).with_state(mock.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            endpoint: format!("http://{addr}"),
            mock,
            handle,
        }
    }

    fn seen(&self) -> Vec<Seen> {
        self.mock.seen.lock().unwrap().clone()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn task_request(name: Option<&str>) -> CreateTaskRequest {
    let parent: QueuePath = "projects/p/locations/l/queues/q".parse().unwrap();
    let mut req = CreateTaskRequest::new(
        parent.clone(),
        MaterializedRequest {
            method: HttpMethod::Post,
            url: "http://listener/basic".into(),
            headers: [("Content-Type".to_string(), "application/json".to_string())].into(),
            body: Some(br#"{"a":1}"#.to_vec()),
        },
    );
    req.task.name = name.map(|n| parent.task_name(n));
    req
}

fn job_request(name: &str, schedule: &str) -> CreateJobRequest {
    let parent: LocationPath = "projects/p/locations/l".parse().unwrap();
    let target = HttpTarget::from(MaterializedRequest {
        method: HttpMethod::Post,
        url: "http://listener/tick".into(),
        headers: Default::default(),
        body: None,
    });
    CreateJobRequest {
        job: Job {
            name: parent.job_name(name),
            description: None,
            schedule: schedule.into(),
            time_zone: "UTC".into(),
            http_target: target,
            retry_config: None,
            attempt_deadline: None,
            state: None,
            status: None,
            schedule_time: None,
            last_attempt_time: None,
            user_update_time: None,
            extra: Default::default(),
        },
        parent,
    }
}

#[tokio::test]
async fn create_task_posts_the_task_envelope() {
    let server = MockServer::start().await;
    let client = CloudTasksClient::new(&server.endpoint, Arc::new(StaticToken::new("secret"))).unwrap();

    let task = client.create_task(task_request(None), TIMEOUT).await.unwrap();
    assert_eq!(task.name.as_deref(), Some("projects/p/locations/l/queues/q/tasks/generated"));
    assert_eq!(task.http_request.body.as_deref(), Some(br#"{"a":1}"#.as_slice()));

    let seen = server.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].path, "/v2/projects/p/locations/l/queues/q/tasks");
    assert_eq!(seen[0].auth.as_deref(), Some("Bearer secret"));
    assert_eq!(seen[0].body["task"]["httpRequest"]["body"], "eyJhIjoxfQ==");
    assert_eq!(seen[0].body["task"]["httpRequest"]["httpMethod"], "POST");
}

#[tokio::test]
async fn duplicate_task_name_maps_to_already_exists() {
    let server = MockServer::start().await;
    let client = CloudTasksClient::new(&server.endpoint, Arc::new(NoAuth)).unwrap();

    let err = client.create_task(task_request(Some("dup")), TIMEOUT).await.unwrap_err();
    assert_eq!(
        err,
        SinkError::AlreadyExists("projects/p/locations/l/queues/q/tasks/dup".into())
    );
    assert!(server.seen()[0].auth.is_none());
}

#[tokio::test]
async fn scheduler_get_delete_and_create() {
    let server = MockServer::start().await;
    let client = CloudSchedulerClient::new(&server.endpoint, Arc::new(NoAuth)).unwrap();

    let job = client.get_job(KNOWN_JOB, TIMEOUT).await.unwrap();
    assert_eq!(job.state.as_deref(), Some("ENABLED"));
    assert!(job.user_update_time.is_some());

    let missing = client
        .get_job("projects/p/locations/l/jobs/missing", TIMEOUT)
        .await
        .unwrap_err();
    assert!(missing.is_not_found());

    client.delete_job(KNOWN_JOB, TIMEOUT).await.unwrap();

    let created = client.create_job(job_request("fresh", "*/5 * * * *"), TIMEOUT).await.unwrap();
    assert_eq!(created.name, "projects/p/locations/l/jobs/fresh");
    assert_eq!(created.state.as_deref(), Some("ENABLED"));

    let paths: Vec<_> = server.seen().into_iter().map(|s| (s.method, s.path)).collect();
    assert_eq!(
        paths,
        vec![
            (Method::GET, format!("/v1/{KNOWN_JOB}")),
            (Method::GET, "/v1/projects/p/locations/l/jobs/missing".to_string()),
            (Method::DELETE, format!("/v1/{KNOWN_JOB}")),
            (Method::POST, "/v1/projects/p/locations/l/jobs".to_string()),
        ]
    );
}

#[tokio::test]
async fn api_errors_carry_the_service_message() {
    let server = MockServer::start().await;
    let client = CloudSchedulerClient::new(&server.endpoint, Arc::new(NoAuth)).unwrap();

    let err = client.create_job(job_request("bad", "invalid"), TIMEOUT).await.unwrap_err();
    assert_eq!(
        err,
        SinkError::Api {
            status: 400,
            message: "bad schedule".into()
        }
    );
    assert!(!err.is_retryable());
}
