//! Deferred dispatch: turn a call into a queued task.
//!
//! ## Flow
//!
//! ```text
//! CallArgs
//!   ↓
//! 1. Materialize the request (method, url, headers, body)
//!   ↓
//! 2. Wrap it in a CreateTaskRequest for the configured queue
//!   ↓
//! 3. Apply countdown (schedule time) and dedup id (task name)
//!   ↓
//! 4. Run the hook chain
//!   ↓
//! 5. Submit once, with the create timeout
//! ```
//!
//! Exactly one sink call per `delay`; nothing is retried here. A dedup id
//! that was already used surfaces as [`DispatchError::Conflict`] and the
//! caller decides what that means.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use taskroute_core::{CallArgs, MaterializeError, ParameterSchema, QueuePath, RequestMaterializer};

use crate::envelope::{CreateTaskRequest, Task};
use crate::hooks::TaskHook;
use crate::sink::{SinkError, TaskSink};

/// Default timeout for the create call.
pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest task id the queue accepts.
pub const MAX_TASK_ID_LEN: usize = 500;

/// Task ids are a single name segment of ASCII letters, digits, `-` and `_`.
pub fn is_valid_task_id(task_id: &str) -> bool {
    !task_id.is_empty()
        && task_id.len() <= MAX_TASK_ID_LEN
        && task_id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    /// The call arguments do not fit the handler's parameters.
    #[error(transparent)]
    Materialize(#[from] MaterializeError),
    /// The countdown puts the schedule time past what a timestamp can hold.
    #[error("countdown out of range: {countdown:?}")]
    InvalidCountdown { countdown: Duration },
    /// The dedup id cannot be used as a task name segment.
    #[error("invalid task id `{task_id}`: only letters, digits, `-` and `_`, at most {MAX_TASK_ID_LEN} characters")]
    InvalidTaskId { task_id: String },
    /// A task with this dedup id already exists (or existed recently).
    #[error("task already exists: {task_name}")]
    Conflict { task_name: String },
    /// The queue rejected or failed the create call.
    #[error("queue error: {0}")]
    Sink(SinkError),
}

impl From<SinkError> for DispatchError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::AlreadyExists(task_name) => DispatchError::Conflict { task_name },
            other => DispatchError::Sink(other),
        }
    }
}

/// Per-dispatch settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayOptions {
    pub queue_path: QueuePath,
    pub create_timeout: Duration,
    /// Delay before the task becomes eligible; zero means immediately.
    pub countdown: Duration,
    /// Caller-chosen task id for deduplication.
    pub task_id: Option<String>,
}

impl DelayOptions {
    pub fn new(queue_path: QueuePath) -> Self {
        Self {
            queue_path,
            create_timeout: DEFAULT_CREATE_TIMEOUT,
            countdown: Duration::ZERO,
            task_id: None,
        }
    }

    pub fn with_countdown(mut self, countdown: Duration) -> Self {
        self.countdown = countdown;
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_create_timeout(mut self, timeout: Duration) -> Self {
        self.create_timeout = timeout;
        self
    }
}

/// Dispatches calls of one handler onto a queue.
#[derive(Clone)]
pub struct Delayer {
    schema: Arc<ParameterSchema>,
    materializer: RequestMaterializer,
    options: DelayOptions,
    sink: Arc<dyn TaskSink>,
    hook: TaskHook,
}

impl Delayer {
    pub fn new(
        schema: Arc<ParameterSchema>,
        materializer: RequestMaterializer,
        options: DelayOptions,
        sink: Arc<dyn TaskSink>,
        hook: TaskHook,
    ) -> Self {
        Self {
            schema,
            materializer,
            options,
            sink,
            hook,
        }
    }

    pub fn options(&self) -> &DelayOptions {
        &self.options
    }

    pub fn countdown(mut self, countdown: Duration) -> Self {
        self.options.countdown = countdown;
        self
    }

    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.options.task_id = Some(task_id.into());
        self
    }

    pub fn create_timeout(mut self, timeout: Duration) -> Self {
        self.options.create_timeout = timeout;
        self
    }

    pub fn queue(mut self, queue_path: QueuePath) -> Self {
        self.options.queue_path = queue_path;
        self
    }

    /// Everything `delay` does except submitting.
    pub fn build_request(&self, args: &CallArgs) -> Result<CreateTaskRequest, DispatchError> {
        // 1) Materialize
        let request = self.materializer.materialize(&self.schema, args)?;

        // 2) Wrap
        let mut create = CreateTaskRequest::new(self.options.queue_path.clone(), request);

        // 3) Countdown and dedup
        let countdown = self.options.countdown;
        if !countdown.is_zero() {
            let at = chrono::Duration::from_std(countdown)
                .ok()
                .and_then(|d| Utc::now().checked_add_signed(d))
                .ok_or(DispatchError::InvalidCountdown { countdown })?;
            create.task.schedule_time = Some(at);
        }
        if let Some(task_id) = &self.options.task_id {
            if !is_valid_task_id(task_id) {
                return Err(DispatchError::InvalidTaskId { task_id: task_id.clone() });
            }
            create.task.name = Some(self.options.queue_path.task_name(task_id));
        }

        // 4) Hooks
        Ok(self.hook.apply(create))
    }

    /// Enqueue one task for `args`.
    #[tracing::instrument(
        skip(self, args),
        fields(handler = %self.schema.unique_id(), queue = %self.options.queue_path, task_id = ?self.options.task_id)
    )]
    pub async fn delay(&self, args: &CallArgs) -> Result<Task, DispatchError> {
        let request = self.build_request(args)?;

        // 5) Submit
        let task = self
            .sink
            .create_task(request, self.options.create_timeout)
            .await
            .map_err(|err| {
                if err.is_conflict() {
                    tracing::info!(error = %err, "duplicate task rejected by queue");
                } else {
                    tracing::warn!(error = %err, "task creation failed");
                }
                DispatchError::from(err)
            })?;

        tracing::debug!(task = ?task.name, schedule_time = ?task.schedule_time, "task enqueued");
        Ok(task)
    }
}

impl std::fmt::Debug for Delayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delayer")
            .field("handler", &self.schema.unique_id())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
