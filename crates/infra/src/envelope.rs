//! Creation requests sent to the queue and the scheduler.
//!
//! The structs serialize to the Cloud Tasks v2 / Cloud Scheduler v1 JSON
//! shapes (camelCase keys, base64 bodies, `"10s"` durations), so the REST
//! sinks can send them as-is and the in-memory sinks store exactly what a
//! remote service would see.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use taskroute_core::{HttpMethod, LocationPath, MaterializedRequest, QueuePath};

use crate::retry::JobRetryConfig;

/// OpenID Connect token the platform mints when calling the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcToken {
    pub service_account_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

impl OidcToken {
    pub fn new(service_account_email: impl Into<String>) -> Self {
        Self {
            service_account_email: service_account_email.into(),
            audience: None,
        }
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }
}

/// OAuth access token the platform mints when calling a Google API target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthToken {
    pub service_account_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl OAuthToken {
    pub fn new(service_account_email: impl Into<String>) -> Self {
        Self {
            service_account_email: service_account_email.into(),
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// HTTP request carried by a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    pub url: String,
    pub http_method: HttpMethod,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_body")]
    pub body: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc_token: Option<OidcToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_token: Option<OAuthToken>,
}

impl From<MaterializedRequest> for HttpRequest {
    fn from(req: MaterializedRequest) -> Self {
        Self {
            url: req.url,
            http_method: req.method,
            headers: req.headers,
            body: req.body,
            oidc_token: None,
            oauth_token: None,
        }
    }
}

/// A task as stored by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Set for deduplicated tasks; assigned by the queue otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub http_request: HttpRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "duration_secs")]
    pub dispatch_deadline: Option<Duration>,
}

/// Request to create one task in a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTaskRequest {
    pub parent: QueuePath,
    pub task: Task,
}

impl CreateTaskRequest {
    pub fn new(parent: QueuePath, request: MaterializedRequest) -> Self {
        Self {
            parent,
            task: Task {
                name: None,
                http_request: request.into(),
                schedule_time: None,
                dispatch_deadline: None,
            },
        }
    }
}

/// HTTP target of a scheduled job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpTarget {
    pub uri: String,
    pub http_method: HttpMethod,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_body")]
    pub body: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc_token: Option<OidcToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_token: Option<OAuthToken>,
}

impl From<MaterializedRequest> for HttpTarget {
    fn from(req: MaterializedRequest) -> Self {
        Self {
            uri: req.url,
            http_method: req.method,
            headers: req.headers,
            body: req.body,
            oidc_token: None,
            oauth_token: None,
        }
    }
}

/// A scheduled job, as desired locally or as reported by the scheduler.
///
/// Fields below `attempt_deadline` are assigned by the scheduler and never
/// sent on create; `extra` keeps anything else the service reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schedule: String,
    pub time_zone: String,
    pub http_target: HttpTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_config: Option<JobRetryConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "duration_secs")]
    pub attempt_deadline: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_update_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Request to create one job in a location.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateJobRequest {
    pub parent: LocationPath,
    pub job: Job,
}

/// Field access the built-in hooks need, shared by both request kinds.
pub trait CreationRequest {
    fn set_oidc_token(&mut self, token: OidcToken);
    fn set_oauth_token(&mut self, token: OAuthToken);
    fn set_deadline(&mut self, deadline: Duration);
}

impl CreationRequest for CreateTaskRequest {
    fn set_oidc_token(&mut self, token: OidcToken) {
        self.task.http_request.oauth_token = None;
        self.task.http_request.oidc_token = Some(token);
    }

    fn set_oauth_token(&mut self, token: OAuthToken) {
        self.task.http_request.oidc_token = None;
        self.task.http_request.oauth_token = Some(token);
    }

    fn set_deadline(&mut self, deadline: Duration) {
        self.task.dispatch_deadline = Some(deadline);
    }
}

impl CreationRequest for CreateJobRequest {
    fn set_oidc_token(&mut self, token: OidcToken) {
        self.job.http_target.oauth_token = None;
        self.job.http_target.oidc_token = Some(token);
    }

    fn set_oauth_token(&mut self, token: OAuthToken) {
        self.job.http_target.oidc_token = None;
        self.job.http_target.oauth_token = Some(token);
    }

    fn set_deadline(&mut self, deadline: Duration) {
        self.job.attempt_deadline = Some(deadline);
    }
}

/// Format a duration the way the Google APIs expect (`"10s"`, `"1.5s"`).
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let nanos = duration.subsec_nanos();
    if nanos == 0 {
        return format!("{secs}s");
    }

    let mut fractional = format!("{nanos:09}");
    while fractional.ends_with('0') {
        fractional.pop();
    }
    format!("{secs}.{fractional}s")
}

/// Parse `"10s"` / `"1.5s"`.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let secs = text.strip_suffix('s')?;
    let (whole, frac) = secs.split_once('.').unwrap_or((secs, ""));
    let whole: u64 = whole.parse().ok()?;
    if frac.len() > 9 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let nanos: u32 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<9}").parse().ok()?
    };
    Some(Duration::new(whole, nanos))
}

pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_str(&super::format_duration(*d)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let text: Option<String> = Option::deserialize(d)?;
        text.map(|t| {
            super::parse_duration(&t)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid duration `{t}`")))
        })
        .transpose()
    }
}

mod base64_body {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_str(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let text: Option<String> = Option::deserialize(d)?;
        text.map(|t| STANDARD.decode(t.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> MaterializedRequest {
        MaterializedRequest {
            method: HttpMethod::Post,
            url: "http://x/hello".into(),
            headers: BTreeMap::from([("Content-Type".to_string(), "application/json".to_string())]),
            body: Some(br#"{"a":1}"#.to_vec()),
        }
    }

    #[test]
    fn durations_format_like_the_api() {
        assert_eq!(format_duration(Duration::from_secs(10)), "10s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("300s"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("3m"), None);
    }

    #[test]
    fn task_serializes_to_the_wire_shape() {
        let parent = "projects/p/locations/l/queues/q".parse().unwrap();
        let mut req = CreateTaskRequest::new(parent, request());
        req.set_deadline(Duration::from_secs(30));
        req.set_oidc_token(OidcToken::new("sa@p.iam.gserviceaccount.com").with_audience("http://x"));

        let wire = serde_json::to_value(&req.task).unwrap();
        assert_eq!(
            wire,
            json!({
                "httpRequest": {
                    "url": "http://x/hello",
                    "httpMethod": "POST",
                    "headers": {"Content-Type": "application/json"},
                    "body": "eyJhIjoxfQ==",
                    "oidcToken": {
                        "serviceAccountEmail": "sa@p.iam.gserviceaccount.com",
                        "audience": "http://x"
                    }
                },
                "dispatchDeadline": "30s"
            })
        );

        let back: Task = serde_json::from_value(wire).unwrap();
        assert_eq!(back, req.task);
    }

    #[test]
    fn oauth_and_oidc_are_exclusive() {
        let parent = "projects/p/locations/l/queues/q".parse().unwrap();
        let mut req = CreateTaskRequest::new(parent, request());
        req.set_oidc_token(OidcToken::new("a"));
        req.set_oauth_token(OAuthToken::new("b"));
        assert!(req.task.http_request.oidc_token.is_none());
        assert_eq!(req.task.http_request.oauth_token, Some(OAuthToken::new("b")));
    }

    #[test]
    fn job_keeps_unknown_fields() {
        let job: Job = serde_json::from_value(json!({
            "name": "projects/p/locations/l/jobs/j",
            "schedule": "*/5 * * * *",
            "timeZone": "UTC",
            "httpTarget": {"uri": "http://x", "httpMethod": "GET"},
            "state": "ENABLED",
            "legacyAppEngineCron": false
        }))
        .unwrap();

        assert_eq!(job.state.as_deref(), Some("ENABLED"));
        assert_eq!(job.extra.get("legacyAppEngineCron"), Some(&json!(false)));
    }
}
