//! Route registration handles.
//!
//! A [`TaskRouteBuilder`] holds what every deferred route of a process
//! shares (base URL, queue, scheduler location, sinks, hooks). Binding a
//! handler's [`ParameterSchema`] to it yields a [`TaskRoute`], the
//! capability through which the handler is delayed or scheduled.

use std::sync::Arc;
use std::time::Duration;

use taskroute_core::{CallArgs, LocationPath, MaterializeError, ParameterSchema, QueuePath, RequestMaterializer};

use crate::config::{ConfigError, TaskrouteConfig};
use crate::delayer::{DelayOptions, Delayer, DispatchError, DEFAULT_CREATE_TIMEOUT};
use crate::envelope::Task;
use crate::hooks::{JobHook, TaskHook};
use crate::scheduler::{ReconcileError, ReconcileOutcome, JobSettings, Scheduler, DEFAULT_JOB_TIMEOUT};
use crate::sink::{SchedulerSink, TaskSink};

/// Shared wiring for all deferred routes.
#[derive(Clone)]
pub struct TaskRouteBuilder {
    materializer: RequestMaterializer,
    queue_path: QueuePath,
    location: LocationPath,
    task_create_timeout: Duration,
    job_create_timeout: Duration,
    task_sink: Arc<dyn TaskSink>,
    scheduler_sink: Arc<dyn SchedulerSink>,
    task_hook: TaskHook,
    job_hook: JobHook,
}

impl TaskRouteBuilder {
    /// Scheduled jobs default to the queue's location.
    pub fn new(
        base_url: &str,
        queue_path: QueuePath,
        task_sink: Arc<dyn TaskSink>,
        scheduler_sink: Arc<dyn SchedulerSink>,
    ) -> Result<Self, MaterializeError> {
        Ok(Self {
            materializer: RequestMaterializer::new(base_url)?,
            location: queue_path.location_path().clone(),
            queue_path,
            task_create_timeout: DEFAULT_CREATE_TIMEOUT,
            job_create_timeout: DEFAULT_JOB_TIMEOUT,
            task_sink,
            scheduler_sink,
            task_hook: TaskHook::noop(),
            job_hook: JobHook::noop(),
        })
    }

    pub fn from_config(
        config: &TaskrouteConfig,
        task_sink: Arc<dyn TaskSink>,
        scheduler_sink: Arc<dyn SchedulerSink>,
    ) -> Result<Self, ConfigError> {
        let builder = Self::new(&config.base_url, config.queue_path()?, task_sink, scheduler_sink)
            .map_err(|e| ConfigError::Invalid {
                key: "TASK_LISTENER_BASE_URL",
                reason: e.to_string(),
            })?;
        Ok(builder
            .location(config.location_path()?)
            .task_create_timeout(config.task_create_timeout)
            .job_create_timeout(config.job_create_timeout))
    }

    pub fn location(mut self, location: LocationPath) -> Self {
        self.location = location;
        self
    }

    pub fn task_hook(mut self, hook: TaskHook) -> Self {
        self.task_hook = hook;
        self
    }

    pub fn job_hook(mut self, hook: JobHook) -> Self {
        self.job_hook = hook;
        self
    }

    pub fn task_create_timeout(mut self, timeout: Duration) -> Self {
        self.task_create_timeout = timeout;
        self
    }

    pub fn job_create_timeout(mut self, timeout: Duration) -> Self {
        self.job_create_timeout = timeout;
        self
    }

    pub fn queue_path(&self) -> &QueuePath {
        &self.queue_path
    }

    pub fn bind(&self, schema: ParameterSchema) -> TaskRoute {
        TaskRoute {
            schema: Arc::new(schema),
            defaults: DelayOptions::new(self.queue_path.clone()).with_create_timeout(self.task_create_timeout),
            shared: self.clone(),
        }
    }
}

impl std::fmt::Debug for TaskRouteBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRouteBuilder")
            .field("base_url", &self.materializer.base_url().as_str())
            .field("queue_path", &self.queue_path)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// A handler bound for deferred execution.
#[derive(Clone)]
pub struct TaskRoute {
    schema: Arc<ParameterSchema>,
    defaults: DelayOptions,
    shared: TaskRouteBuilder,
}

impl TaskRoute {
    pub fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    /// Route-level default options; per-call options start from these.
    pub fn with_defaults(mut self, f: impl FnOnce(DelayOptions) -> DelayOptions) -> Self {
        self.defaults = f(self.defaults);
        self
    }

    /// A delayer starting from the route defaults, for per-call overrides.
    pub fn options(&self) -> Delayer {
        self.delayer(self.defaults.clone())
    }

    /// Enqueue a call with the route defaults.
    pub async fn delay(&self, args: &CallArgs) -> Result<Task, DispatchError> {
        self.options().delay(args).await
    }

    /// Enqueue a call with explicit options.
    pub async fn dispatch(&self, args: &CallArgs, options: DelayOptions) -> Result<Task, DispatchError> {
        self.delayer(options).delay(args).await
    }

    /// A scheduler for this handler, named after its unique id and placed
    /// in the shared location.
    pub fn scheduler(&self, schedule: impl Into<String>) -> Scheduler {
        let settings = JobSettings {
            create_timeout: self.shared.job_create_timeout,
            ..JobSettings::new(self.schema.unique_id(), self.shared.location.clone(), schedule)
        };
        self.scheduler_for(settings)
    }

    pub fn scheduler_for(&self, settings: JobSettings) -> Scheduler {
        Scheduler::new(
            Arc::clone(&self.schema),
            self.shared.materializer.clone(),
            settings,
            Arc::clone(&self.shared.scheduler_sink),
            self.shared.job_hook.clone(),
        )
    }

    /// Reconcile a schedule for the given registration-time arguments.
    pub async fn reconcile(&self, settings: JobSettings, args: &CallArgs) -> Result<ReconcileOutcome, ReconcileError> {
        self.scheduler_for(settings).reconcile(args).await
    }

    fn delayer(&self, options: DelayOptions) -> Delayer {
        Delayer::new(
            Arc::clone(&self.schema),
            self.shared.materializer.clone(),
            options,
            Arc::clone(&self.shared.task_sink),
            self.shared.task_hook.clone(),
        )
    }
}

impl std::fmt::Debug for TaskRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRoute")
            .field("handler", &self.schema.unique_id())
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}
