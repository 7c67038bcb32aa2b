//! Cloud Scheduler v1 sink.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;

use super::{RestClient, TokenSource};
use crate::envelope::{CreateJobRequest, Job};
use crate::sink::{SchedulerSink, SinkError};

pub const DEFAULT_ENDPOINT: &str = "https://cloudscheduler.googleapis.com";

/// Reads, deletes and creates jobs through the v1 REST API.
#[derive(Debug, Clone)]
pub struct CloudSchedulerClient {
    rest: RestClient,
}

impl CloudSchedulerClient {
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
impl SchedulerSink for CloudSchedulerClient {
    #[tracing::instrument(skip(self))]
    async fn get_job(&self, name: &str, timeout: Duration) -> Result<Job, SinkError> {
        let builder = self.rest.request(Method::GET, &format!("v1/{name}"), timeout).await?;
        self.rest.send(builder, name, timeout).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_job(&self, name: &str, timeout: Duration) -> Result<(), SinkError> {
        let builder = self.rest.request(Method::DELETE, &format!("v1/{name}"), timeout).await?;
        let _: serde_json::Value = self.rest.send(builder, name, timeout).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, request), fields(job = %request.job.name))]
    async fn create_job(&self, request: CreateJobRequest, timeout: Duration) -> Result<Job, SinkError> {
        let builder = self
            .rest
            .request(Method::POST, &format!("v1/{}/jobs", request.parent), timeout)
            .await?
            .json(&request.job);
        self.rest.send(builder, &request.job.name, timeout).await
    }
}
