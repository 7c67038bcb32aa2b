//! REST sinks for Cloud Tasks v2 and Cloud Scheduler v1.
//!
//! Both share [`RestClient`]: one `reqwest` client, a configurable endpoint
//! (production or an emulator) and a [`TokenSource`] for bearer auth.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::sink::SinkError;

pub mod auth;
pub mod cloud_scheduler;
pub mod cloud_tasks;

pub use auth::{NoAuth, StaticToken, TokenSource};
pub use cloud_scheduler::CloudSchedulerClient;
pub use cloud_tasks::CloudTasksClient;

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Error body returned by Google APIs.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

/// Shared HTTP plumbing for the REST sinks.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn TokenSource>,
}

impl RestClient {
    pub fn new(endpoint: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| SinkError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self::with_client(http, endpoint, tokens))
    }

    pub fn with_client(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self { http, endpoint, tokens }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, method: Method, path: &str, timeout: Duration) -> Result<RequestBuilder, SinkError> {
        let url = format!("{}/{}", self.endpoint, path.trim_start_matches('/'));
        let mut builder = self.http.request(method, url).timeout(timeout);
        if let Some(token) = self.tokens.token(&[CLOUD_PLATFORM_SCOPE]).await? {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    /// Send and decode a JSON response, mapping 404/409 onto `resource`.
    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        resource: &str,
        timeout: Duration,
    ) -> Result<T, SinkError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                SinkError::Timeout(timeout)
            } else {
                SinkError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| SinkError::Decode(e.to_string()));
        }

        let text = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(SinkError::NotFound(resource.to_string())),
            StatusCode::CONFLICT => Err(SinkError::AlreadyExists(resource.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SinkError::Auth(error_message(&text))),
            _ => Err(SinkError::Api {
                status: status.as_u16(),
                message: error_message(&text),
            }),
        }
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorResponse>(body)
        .map(|r| r.error.message)
        .unwrap_or_else(|_| body.to_string())
}
