//! Infrastructure layer: envelopes, dispatch, schedule reconciliation,
//! and the sinks that talk to the task queue and the cron scheduler.

pub mod config;
pub mod delayer;
pub mod envelope;
pub mod hooks;
pub mod memory;
pub mod rest;
pub mod retry;
pub mod route;
pub mod scheduler;
pub mod sink;

pub use config::{ConfigError, TaskrouteConfig};
pub use delayer::{DelayOptions, Delayer, DispatchError};
pub use envelope::{
    CreateJobRequest, CreateTaskRequest, CreationRequest, HttpRequest, HttpTarget, Job, OAuthToken, OidcToken, Task,
};
pub use hooks::{Hook, JobHook, TaskHook};
pub use memory::{InMemorySchedulerSink, InMemoryTaskSink};
pub use retry::JobRetryConfig;
pub use route::{TaskRoute, TaskRouteBuilder};
pub use scheduler::{
    CheckOutcome, DeletePhase, Difference, JobNormalizer, ReconcileError, ReconcileOutcome, JobSettings, Scheduler,
};
pub use sink::{SchedulerSink, SinkError, TaskSink};
