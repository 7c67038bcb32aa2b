//! Process configuration, loaded from the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use taskroute_core::{LocationPath, QueuePath, RequestMaterializer, ResourceNameError};

use crate::rest::{cloud_scheduler, cloud_tasks};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error(transparent)]
    ResourceName(#[from] ResourceNameError),
}

/// Everything needed to wire routes to a queue and a scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskrouteConfig {
    /// Use in-memory sinks and skip schedule registration.
    pub is_local: bool,
    /// Where delivered requests are sent; route paths are appended to it.
    pub base_url: String,
    pub project_id: String,
    pub location: String,
    /// Scheduler location; the queue's location when unset.
    pub scheduled_location: Option<String>,
    pub queue: String,
    /// Identity the platform uses to call the listener.
    pub service_account: String,
    pub task_create_timeout: Duration,
    pub job_create_timeout: Duration,
    pub tasks_endpoint: String,
    pub scheduler_endpoint: String,
    pub port: u16,
}

impl Default for TaskrouteConfig {
    fn default() -> Self {
        let project_id = "sample-project".to_string();
        Self {
            is_local: true,
            base_url: "http://localhost:8000/_taskroute".to_string(),
            service_account: default_service_account(&project_id),
            project_id,
            location: "asia-south1".to_string(),
            scheduled_location: None,
            queue: "test-queue".to_string(),
            task_create_timeout: Duration::from_secs(10),
            job_create_timeout: Duration::from_secs(10),
            tasks_endpoint: cloud_tasks::DEFAULT_ENDPOINT.to_string(),
            scheduler_endpoint: cloud_scheduler::DEFAULT_ENDPOINT.to_string(),
            port: 8080,
        }
    }
}

fn default_service_account(project_id: &str) -> String {
    format!("taskroute@{project_id}.iam.gserviceaccount.com")
}

impl TaskrouteConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("IS_LOCAL") {
            config.is_local = parse_bool("IS_LOCAL", &v)?;
        }
        if let Some(v) = get("TASK_LISTENER_BASE_URL") {
            config.base_url = v;
        }
        if let Some(v) = get("TASK_PROJECT_ID") {
            config.service_account = default_service_account(&v);
            config.project_id = v;
        }
        if let Some(v) = get("TASK_LOCATION") {
            config.location = v;
        }
        config.scheduled_location = get("SCHEDULED_LOCATION");
        if let Some(v) = get("TASK_QUEUE") {
            config.queue = v;
        }
        if let Some(v) = get("TASK_SERVICE_ACCOUNT") {
            config.service_account = v;
        }
        if let Some(v) = get("TASK_CREATE_TIMEOUT_SECS") {
            config.task_create_timeout = parse_secs("TASK_CREATE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("JOB_CREATE_TIMEOUT_SECS") {
            config.job_create_timeout = parse_secs("JOB_CREATE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("CLOUD_TASKS_ENDPOINT") {
            config.tasks_endpoint = v;
        }
        if let Some(v) = get("CLOUD_SCHEDULER_ENDPOINT") {
            config.scheduler_endpoint = v;
        }
        if let Some(v) = get("PORT") {
            config.port = v.trim().parse().map_err(|e| ConfigError::Invalid {
                key: "PORT",
                reason: format!("{e}"),
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        RequestMaterializer::new(&self.base_url).map_err(|e| ConfigError::Invalid {
            key: "TASK_LISTENER_BASE_URL",
            reason: e.to_string(),
        })?;
        self.queue_path()?;
        self.location_path()?;
        Ok(())
    }

    pub fn queue_path(&self) -> Result<QueuePath, ConfigError> {
        Ok(QueuePath::new(&self.project_id, &self.location, &self.queue)?)
    }

    /// Scheduler location, falling back to the queue's location.
    pub fn location_path(&self) -> Result<LocationPath, ConfigError> {
        let location = self.scheduled_location.as_deref().unwrap_or(&self.location);
        Ok(LocationPath::new(&self.project_id, location)?)
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("`{other}` is not a boolean"),
        }),
    }
}

fn parse_secs(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = value.trim().parse().map_err(|e| ConfigError::Invalid {
        key,
        reason: format!("{e}"),
    })?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be a positive number of seconds".to_string(),
        });
    }
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = TaskrouteConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, TaskrouteConfig::default());
        assert_eq!(
            config.queue_path().unwrap().to_string(),
            "projects/sample-project/locations/asia-south1/queues/test-queue"
        );
        assert_eq!(
            config.location_path().unwrap().to_string(),
            "projects/sample-project/locations/asia-south1"
        );
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = TaskrouteConfig::from_lookup(lookup(&[
            ("IS_LOCAL", "false"),
            ("TASK_PROJECT_ID", "acme"),
            ("SCHEDULED_LOCATION", "us-central1"),
            ("TASK_CREATE_TIMEOUT_SECS", "2.5"),
            ("PORT", "9000"),
        ]))
        .unwrap();

        assert!(!config.is_local);
        assert_eq!(config.service_account, "taskroute@acme.iam.gserviceaccount.com");
        assert_eq!(config.task_create_timeout, Duration::from_millis(2500));
        assert_eq!(config.port, 9000);
        assert_eq!(
            config.location_path().unwrap().to_string(),
            "projects/acme/locations/us-central1"
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = TaskrouteConfig::from_lookup(lookup(&[("IS_LOCAL", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "IS_LOCAL", .. }));

        let err = TaskrouteConfig::from_lookup(lookup(&[("TASK_LISTENER_BASE_URL", "not a url")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "TASK_LISTENER_BASE_URL", .. }));

        let err = TaskrouteConfig::from_lookup(lookup(&[("TASK_QUEUE", "a/b")])).unwrap_err();
        assert!(matches!(err, ConfigError::ResourceName(_)));
    }

    #[test]
    fn timeouts_too_large_for_a_duration_are_rejected() {
        let err = TaskrouteConfig::from_lookup(lookup(&[("TASK_CREATE_TIMEOUT_SECS", "1e30")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "TASK_CREATE_TIMEOUT_SECS", .. }));

        let err = TaskrouteConfig::from_lookup(lookup(&[("TASK_CREATE_TIMEOUT_SECS", "-3")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "TASK_CREATE_TIMEOUT_SECS", .. }));
    }
}
