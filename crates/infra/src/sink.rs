//! Remote queue and scheduler abstractions.
//!
//! One awaited call per remote operation, with a per-call timeout. Sinks
//! never retry locally.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::envelope::{CreateJobRequest, CreateTaskRequest, Job, Task};

/// Errors reported by a sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("auth error: {0}")]
    Auth(String),
}

impl SinkError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SinkError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SinkError::AlreadyExists(_))
    }

    /// Transient failures that a caller may reasonably retry later.
    pub fn is_retryable(&self) -> bool {
        match self {
            SinkError::Timeout(_) | SinkError::Transport(_) => true,
            SinkError::Api { status, .. } => *status == 429 || *status >= 500,
            SinkError::NotFound(_)
            | SinkError::AlreadyExists(_)
            | SinkError::Decode(_)
            | SinkError::Auth(_) => false,
        }
    }
}

/// A task queue that accepts creation requests.
#[async_trait]
pub trait TaskSink: Send + Sync {
    /// Create a task. A named task that already exists yields
    /// [`SinkError::AlreadyExists`].
    async fn create_task(&self, request: CreateTaskRequest, timeout: Duration) -> Result<Task, SinkError>;
}

/// A cron scheduler holding named jobs.
#[async_trait]
pub trait SchedulerSink: Send + Sync {
    async fn get_job(&self, name: &str, timeout: Duration) -> Result<Job, SinkError>;

    async fn delete_job(&self, name: &str, timeout: Duration) -> Result<(), SinkError>;

    async fn create_job(&self, request: CreateJobRequest, timeout: Duration) -> Result<Job, SinkError>;
}

#[async_trait]
impl<T: TaskSink + ?Sized> TaskSink for Arc<T> {
    async fn create_task(&self, request: CreateTaskRequest, timeout: Duration) -> Result<Task, SinkError> {
        (**self).create_task(request, timeout).await
    }
}

#[async_trait]
impl<T: SchedulerSink + ?Sized> SchedulerSink for Arc<T> {
    async fn get_job(&self, name: &str, timeout: Duration) -> Result<Job, SinkError> {
        (**self).get_job(name, timeout).await
    }

    async fn delete_job(&self, name: &str, timeout: Duration) -> Result<(), SinkError> {
        (**self).delete_job(name, timeout).await
    }

    async fn create_job(&self, request: CreateJobRequest, timeout: Duration) -> Result<Job, SinkError> {
        (**self).create_job(request, timeout).await
    }
}
