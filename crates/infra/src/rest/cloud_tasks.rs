//! Cloud Tasks v2 queue sink.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;

use super::{RestClient, TokenSource};
use crate::envelope::{CreateTaskRequest, Task};
use crate::sink::{SinkError, TaskSink};

pub const DEFAULT_ENDPOINT: &str = "https://cloudtasks.googleapis.com";

#[derive(Serialize)]
struct CreateTaskBody<'a> {
    task: &'a Task,
}

/// Creates tasks through `POST /v2/{queue}/tasks`.
#[derive(Debug, Clone)]
pub struct CloudTasksClient {
    rest: RestClient,
}

impl CloudTasksClient {
    pub fn new(endpoint: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Result<Self, SinkError> {
        Ok(Self {
            rest: RestClient::new(endpoint, tokens)?,
        })
    }

    pub fn from_rest(rest: RestClient) -> Self {
        Self { rest }
    }
}

#[async_trait]
impl TaskSink for CloudTasksClient {
    #[tracing::instrument(skip(self, request), fields(queue = %request.parent, task = ?request.task.name))]
    async fn create_task(&self, request: CreateTaskRequest, timeout: Duration) -> Result<Task, SinkError> {
        let resource = request
            .task
            .name
            .clone()
            .unwrap_or_else(|| request.parent.to_string());
        let builder = self
            .rest
            .request(Method::POST, &format!("v2/{}/tasks", request.parent), timeout)
            .await?
            .json(&CreateTaskBody { task: &request.task });

        let task: Task = self.rest.send(builder, &resource, timeout).await?;
        tracing::debug!(task = ?task.name, "task created");
        Ok(task)
    }
}
