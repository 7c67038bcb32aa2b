//! In-memory sinks for tests and local development.
//!
//! They honour the same contracts as the remote services: named tasks are
//! unique (names stay taken after creation), jobs are unique per name, and
//! created jobs come back with the fields the scheduler assigns itself.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::envelope::{CreateJobRequest, CreateTaskRequest, Job, Task};
use crate::sink::{SchedulerSink, SinkError, TaskSink};

/// Header the scheduler adds to every job it stores.
pub const SCHEDULER_USER_AGENT: (&str, &str) = ("User-Agent", "Google-Cloud-Scheduler");

fn poisoned<T>(_: T) -> SinkError {
    SinkError::Transport("in-memory sink lock poisoned".to_string())
}

/// In-memory task queue.
#[derive(Debug, Default)]
pub struct InMemoryTaskSink {
    tasks: RwLock<Vec<Task>>,
    fail_next: Mutex<Option<SinkError>>,
}

impl InMemoryTaskSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make the next `create_task` fail with `err`.
    pub fn fail_next(&self, err: SinkError) {
        if let Ok(mut slot) = self.fail_next.lock() {
            *slot = Some(err);
        }
    }

    /// Tasks accepted so far, in creation order.
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.read().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().map(|t| t.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskSink for InMemoryTaskSink {
    async fn create_task(&self, request: CreateTaskRequest, _timeout: Duration) -> Result<Task, SinkError> {
        if let Some(err) = self.fail_next.lock().map_err(poisoned)?.take() {
            return Err(err);
        }

        let mut tasks = self.tasks.write().map_err(poisoned)?;
        let mut task = request.task;
        let name = match task.name.take() {
            Some(name) => {
                if tasks.iter().any(|t| t.name.as_deref() == Some(name.as_str())) {
                    return Err(SinkError::AlreadyExists(name));
                }
                name
            }
            None => request.parent.task_name(&Uuid::now_v7().simple().to_string()),
        };
        task.name = Some(name);
        tasks.push(task.clone());
        Ok(task)
    }
}

/// A scheduler operation, as recorded by [`InMemorySchedulerSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCall {
    Get(String),
    Delete(String),
    Create(String),
}

#[derive(Debug, Default)]
struct Faults {
    get: Option<SinkError>,
    delete: Option<SinkError>,
    create: Option<SinkError>,
}

/// In-memory cron scheduler.
#[derive(Debug, Default)]
pub struct InMemorySchedulerSink {
    jobs: RwLock<BTreeMap<String, Job>>,
    calls: Mutex<Vec<SchedulerCall>>,
    faults: Mutex<Faults>,
}

impl InMemorySchedulerSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Store `job` as-is, bypassing creation.
    pub fn seed(&self, job: Job) {
        if let Ok(mut jobs) = self.jobs.write() {
            jobs.insert(job.name.clone(), job);
        }
    }

    pub fn job(&self, name: &str) -> Option<Job> {
        self.jobs.read().ok().and_then(|jobs| jobs.get(name).cloned())
    }

    pub fn calls(&self) -> Vec<SchedulerCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of delete and create calls made so far.
    pub fn mutation_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| !matches!(c, SchedulerCall::Get(_)))
            .count()
    }

    pub fn fail_next_get(&self, err: SinkError) {
        if let Ok(mut f) = self.faults.lock() {
            f.get = Some(err);
        }
    }

    pub fn fail_next_delete(&self, err: SinkError) {
        if let Ok(mut f) = self.faults.lock() {
            f.delete = Some(err);
        }
    }

    pub fn fail_next_create(&self, err: SinkError) {
        if let Ok(mut f) = self.faults.lock() {
            f.create = Some(err);
        }
    }

    fn record(&self, call: SchedulerCall) -> Result<(), SinkError> {
        self.calls.lock().map_err(poisoned)?.push(call);
        Ok(())
    }
}

#[async_trait]
impl SchedulerSink for InMemorySchedulerSink {
    async fn get_job(&self, name: &str, _timeout: Duration) -> Result<Job, SinkError> {
        self.record(SchedulerCall::Get(name.to_string()))?;
        if let Some(err) = self.faults.lock().map_err(poisoned)?.get.take() {
            return Err(err);
        }

        self.jobs
            .read()
            .map_err(poisoned)?
            .get(name)
            .cloned()
            .ok_or_else(|| SinkError::NotFound(name.to_string()))
    }

    async fn delete_job(&self, name: &str, _timeout: Duration) -> Result<(), SinkError> {
        self.record(SchedulerCall::Delete(name.to_string()))?;
        if let Some(err) = self.faults.lock().map_err(poisoned)?.delete.take() {
            return Err(err);
        }

        self.jobs
            .write()
            .map_err(poisoned)?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SinkError::NotFound(name.to_string()))
    }

    async fn create_job(&self, request: CreateJobRequest, _timeout: Duration) -> Result<Job, SinkError> {
        self.record(SchedulerCall::Create(request.job.name.clone()))?;
        if let Some(err) = self.faults.lock().map_err(poisoned)?.create.take() {
            return Err(err);
        }

        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if jobs.contains_key(&request.job.name) {
            return Err(SinkError::AlreadyExists(request.job.name));
        }

        let now = Utc::now();
        let mut job = request.job;
        job.state = Some("ENABLED".to_string());
        job.user_update_time = Some(now);
        job.schedule_time = Some(now);
        job.http_target
            .headers
            .insert(SCHEDULER_USER_AGENT.0.to_string(), SCHEDULER_USER_AGENT.1.to_string());

        jobs.insert(job.name.clone(), job.clone());
        Ok(job)
    }
}
