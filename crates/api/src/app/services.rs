//! Service wiring: sinks, hooks and the task routes of the listener.

use std::sync::Arc;
use std::time::Duration;

use taskroute_core::{BodyParam, CallArgs, HttpMethod, ParameterSchema, SchemaError};
use taskroute_infra::hooks::{self, Hook};
use taskroute_infra::rest::{CloudSchedulerClient, CloudTasksClient, NoAuth, TokenSource};
use taskroute_infra::{
    InMemorySchedulerSink, InMemoryTaskSink, JobHook, JobRetryConfig, OidcToken, ReconcileError, ReconcileOutcome,
    SchedulerSink, SinkError, TaskHook, TaskRoute, TaskRouteBuilder, TaskSink, TaskrouteConfig,
};

use crate::app::dto::Payload;

/// Deadline the queue and the scheduler give each delivered request.
pub const HANDLER_DEADLINE: Duration = Duration::from_secs(1800);

/// Retry ceiling of the `fail_twice` handler.
pub const FAIL_TWICE_MAX_RETRIES: u32 = 2;

pub const TIMED_HELLO_JOB: &str = "taskroute-scheduled-hello";
pub const TIMED_HELLO_SCHEDULE: &str = "*/5 * * * *";
pub const TIMED_HELLO_TIME_ZONE: &str = "Asia/Kolkata";

/// Failed timed hello runs are retried three times, 10s apart at first.
pub fn timed_hello_retries() -> JobRetryConfig {
    JobRetryConfig::exponential(3, Duration::from_secs(10), Duration::from_secs(300))
}

/// Bearer token used against the REST APIs when built without `gcp`.
pub const ACCESS_TOKEN_ENV: &str = "TASKROUTE_ACCESS_TOKEN";

pub fn hello_schema() -> Result<ParameterSchema, SchemaError> {
    ParameterSchema::builder("hello", HttpMethod::Post, "/delayed/hello")
        .body(BodyParam::with_default("p", &Payload::default())?)
        .build()
}

pub fn fail_twice_schema() -> Result<ParameterSchema, SchemaError> {
    ParameterSchema::builder("fail_twice", HttpMethod::Post, "/delayed/fail_twice").build()
}

pub fn timed_hello_schema() -> Result<ParameterSchema, SchemaError> {
    ParameterSchema::builder("scheduled_hello", HttpMethod::Post, "/scheduled/timed_hello")
        .body(BodyParam::with_default("p", &Payload::default())?)
        .build()
}

/// Deferred handlers served by this listener.
#[derive(Debug, Clone)]
pub struct Handlers {
    pub hello: TaskRoute,
    pub fail_twice: TaskRoute,
    pub timed_hello: TaskRoute,
}

impl Handlers {
    pub fn bind(builder: &TaskRouteBuilder) -> Result<Self, SchemaError> {
        Ok(Self {
            hello: builder.bind(hello_schema()?),
            fail_twice: builder.bind(fail_twice_schema()?),
            timed_hello: builder.bind(timed_hello_schema()?),
        })
    }
}

/// OIDC identity plus a half-hour deadline, for tasks and jobs alike.
pub fn delivery_hooks(config: &TaskrouteConfig) -> (TaskHook, JobHook) {
    let token = OidcToken::new(&config.service_account).with_audience(&config.base_url);
    let task_hook = Hook::chain([hooks::oidc_token(token.clone()), hooks::deadline(HANDLER_DEADLINE)]);
    let job_hook = Hook::chain([hooks::oidc_token(token), hooks::deadline(HANDLER_DEADLINE)]);
    (task_hook, job_hook)
}

pub struct Sinks {
    pub tasks: Arc<dyn TaskSink>,
    pub jobs: Arc<dyn SchedulerSink>,
}

/// In-memory sinks when local without an emulator endpoint, REST otherwise.
pub async fn build_sinks(config: &TaskrouteConfig) -> Result<Sinks, SinkError> {
    let defaults = TaskrouteConfig::default();
    if config.is_local && config.tasks_endpoint == defaults.tasks_endpoint {
        tracing::warn!("local run without CLOUD_TASKS_ENDPOINT; tasks are kept in memory and never delivered");
        return Ok(Sinks {
            tasks: InMemoryTaskSink::arc(),
            jobs: InMemorySchedulerSink::arc(),
        });
    }

    let tokens: Arc<dyn TokenSource> = if config.is_local {
        Arc::new(NoAuth)
    } else {
        remote_credentials().await?
    };

    tracing::info!(
        tasks = %config.tasks_endpoint,
        scheduler = %config.scheduler_endpoint,
        "using REST sinks"
    );
    Ok(Sinks {
        tasks: Arc::new(CloudTasksClient::new(&config.tasks_endpoint, Arc::clone(&tokens))?),
        jobs: Arc::new(CloudSchedulerClient::new(&config.scheduler_endpoint, tokens)?),
    })
}

#[cfg(feature = "gcp")]
async fn remote_credentials() -> Result<Arc<dyn TokenSource>, SinkError> {
    Ok(Arc::new(taskroute_infra::rest::auth::GcpTokenSource::discover().await?))
}

#[cfg(not(feature = "gcp"))]
async fn remote_credentials() -> Result<Arc<dyn TokenSource>, SinkError> {
    match std::env::var(ACCESS_TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => {
            Ok(Arc::new(taskroute_infra::rest::StaticToken::new(token.trim())))
        }
        _ => {
            tracing::warn!("{ACCESS_TOKEN_ENV} not set and built without `gcp`; calling the APIs unauthenticated");
            Ok(Arc::new(NoAuth))
        }
    }
}

/// Register the timed hello job, replacing it only when it changed.
pub async fn register_schedules(handlers: &Handlers) -> Result<ReconcileOutcome, ReconcileError> {
    let args = CallArgs::new().with_json("p", &Payload::new("Scheduled"))?;
    handlers
        .timed_hello
        .scheduler(TIMED_HELLO_SCHEDULE)
        .name(TIMED_HELLO_JOB)
        .time_zone(TIMED_HELLO_TIME_ZONE)
        .retry_config(timed_hello_retries())
        .reconcile(&args)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(jobs: Arc<InMemorySchedulerSink>) -> TaskRouteBuilder {
        let config = TaskrouteConfig::default();
        let (task_hook, job_hook) = delivery_hooks(&config);
        TaskRouteBuilder::from_config(&config, InMemoryTaskSink::arc(), jobs)
            .unwrap()
            .task_hook(task_hook)
            .job_hook(job_hook)
    }

    #[test]
    fn all_handler_schemas_build() {
        assert!(hello_schema().is_ok());
        assert!(fail_twice_schema().is_ok());
        assert!(timed_hello_schema().is_ok());
    }

    #[tokio::test]
    async fn schedules_register_once() {
        let jobs = InMemorySchedulerSink::arc();
        let handlers = Handlers::bind(&builder(jobs.clone())).unwrap();

        assert!(register_schedules(&handlers).await.unwrap().is_applied());
        assert!(!register_schedules(&handlers).await.unwrap().is_applied());

        let job = jobs
            .job("projects/sample-project/locations/asia-south1/jobs/taskroute-scheduled-hello")
            .unwrap();
        assert_eq!(job.time_zone, TIMED_HELLO_TIME_ZONE);
        assert_eq!(job.attempt_deadline, Some(HANDLER_DEADLINE));
        assert_eq!(job.retry_config, Some(timed_hello_retries()));
        assert_eq!(
            job.http_target.body.as_deref(),
            Some(br#"{"message":"Scheduled"}"#.as_slice())
        );
    }

    #[tokio::test]
    async fn local_default_config_uses_memory_sinks() {
        let sinks = build_sinks(&TaskrouteConfig::default()).await;
        assert!(sinks.is_ok());
    }
}
