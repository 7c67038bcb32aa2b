//! Schedule reconciliation: idempotent upsert of a cron job.
//!
//! Every process start registers the same schedules again. Reconciling
//! compares the desired job with what the scheduler already holds and only
//! replaces it when they differ:
//!
//! ```text
//! CallArgs
//!   ↓
//! 1. Materialize the request, build the desired Job, run hooks
//!   ↓
//! 2. Check: fetch the current job, normalize both sides, compare
//!   ↓            (equal → Unchanged, no mutations)
//! 3. Delete phase: remove the old job (absent is fine, failures only warn)
//!   ↓
//! 4. Create phase: create the desired job (failures are fatal)
//! ```
//!
//! Replacement is always delete-then-create. There is no cross-process lock:
//! two instances reconciling the same job at once can both replace it.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use taskroute_core::{CallArgs, LocationPath, MaterializeError, ParameterSchema, RequestMaterializer};

use crate::envelope::{CreateJobRequest, HttpTarget, Job};
use crate::hooks::JobHook;
use crate::retry::JobRetryConfig;
use crate::sink::{SchedulerSink, SinkError};

pub const DEFAULT_TIME_ZONE: &str = "UTC";

/// Default timeout for each scheduler call.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(10);

/// Job fields the scheduler sets itself.
pub const SYSTEM_FIELDS: [&str; 5] = [
    "state",
    "status",
    "scheduleTime",
    "lastAttemptTime",
    "userUpdateTime",
];

/// Headers the scheduler injects into the job's target.
pub const INJECTED_HEADERS: [&str; 1] = ["User-Agent"];

/// Job values the scheduler fills in when a job leaves them unset, as JSON
/// paths.
pub const SERVER_DEFAULTS: [&[&str]; 4] = [
    &["attemptDeadline"],
    &["retryConfig"],
    &["httpTarget", "oidcToken", "audience"],
    &["httpTarget", "oauthToken", "scope"],
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Materialize(#[from] MaterializeError),
    /// Creating the desired job failed; the old job may already be gone.
    #[error("failed to create job `{name}`: {source}")]
    Create { name: String, source: SinkError },
}

impl ReconcileError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Materialize(_) => false,
            ReconcileError::Create { source, .. } => source.is_retryable(),
        }
    }
}

/// Why the current job has to be replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Difference {
    Forced,
    Missing,
    /// The fetch failed for another reason; treated as different.
    FetchFailed(SinkError),
    Changed,
}

/// Result of the check phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Matches,
    Differs(Difference),
}

/// Result of the delete phase. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletePhase {
    Deleted,
    AlreadyAbsent,
    Failed(SinkError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The scheduler already holds an equivalent job.
    Unchanged,
    /// The job was (re)created.
    Applied {
        reason: Difference,
        delete: DeletePhase,
        job: Box<Job>,
    },
}

impl ReconcileOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ReconcileOutcome::Applied { .. })
    }
}

/// Strips scheduler-assigned data before comparing jobs.
///
/// Field names are the JSON (camelCase) names; header names match
/// case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobNormalizer {
    ignored_fields: BTreeSet<String>,
    ignored_headers: BTreeSet<String>,
}

impl Default for JobNormalizer {
    fn default() -> Self {
        Self {
            ignored_fields: SYSTEM_FIELDS.iter().map(|f| f.to_string()).collect(),
            ignored_headers: INJECTED_HEADERS.iter().map(|h| h.to_ascii_lowercase()).collect(),
        }
    }
}

impl JobNormalizer {
    /// A normalizer that ignores nothing.
    pub fn empty() -> Self {
        Self {
            ignored_fields: BTreeSet::new(),
            ignored_headers: BTreeSet::new(),
        }
    }

    pub fn ignore_field(mut self, field: impl Into<String>) -> Self {
        self.ignored_fields.insert(field.into());
        self
    }

    pub fn ignore_header(mut self, header: &str) -> Self {
        self.ignored_headers.insert(header.to_ascii_lowercase());
        self
    }

    pub fn normalize(&self, job: &Job) -> Value {
        let mut value = serde_json::to_value(job).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.retain(|key, _| !self.ignored_fields.contains(key));

            if let Some(Value::Object(target)) = map.get_mut("httpTarget") {
                let now_empty = match target.get_mut("headers") {
                    Some(Value::Object(headers)) => {
                        headers.retain(|name, _| !self.ignored_headers.contains(&name.to_ascii_lowercase()));
                        headers.is_empty()
                    }
                    _ => false,
                };
                if now_empty {
                    target.remove("headers");
                }
            }
        }
        value
    }

    pub fn equivalent(&self, a: &Job, b: &Job) -> bool {
        self.normalize(a) == self.normalize(b)
    }

    /// Like [`equivalent`](Self::equivalent), but values in
    /// [`SERVER_DEFAULTS`] that `desired` leaves unset are not compared.
    pub fn matches_desired(&self, current: &Job, desired: &Job) -> bool {
        let desired = self.normalize(desired);
        let mut current = self.normalize(current);
        for path in SERVER_DEFAULTS {
            if value_at(&desired, path).is_none() {
                remove_at(&mut current, path);
            }
        }
        current == desired
    }
}

fn value_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |node, key| node.get(*key))
}

fn remove_at(value: &mut Value, path: &[&str]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut node = value;
    for key in parents {
        match node.get_mut(*key) {
            Some(next) => node = next,
            None => return,
        }
    }
    if let Value::Object(map) = node {
        map.remove(*last);
    }
}

/// What to schedule, apart from the request itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    /// Job id within the location.
    pub name: String,
    pub location: LocationPath,
    /// Cron expression.
    pub schedule: String,
    pub time_zone: String,
    pub description: Option<String>,
    pub retry_config: Option<JobRetryConfig>,
    /// Deadline of each run; hooks may still override it.
    pub attempt_deadline: Option<Duration>,
    /// Replace the job even when it is unchanged.
    pub force: bool,
    pub create_timeout: Duration,
}

impl JobSettings {
    pub fn new(name: impl Into<String>, location: LocationPath, schedule: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location,
            schedule: schedule.into(),
            time_zone: DEFAULT_TIME_ZONE.to_string(),
            description: None,
            retry_config: None,
            attempt_deadline: None,
            force: false,
            create_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }

    pub fn job_name(&self) -> String {
        self.location.job_name(&self.name)
    }
}

/// Reconciles one scheduled job of one handler.
#[derive(Clone)]
pub struct Scheduler {
    schema: Arc<ParameterSchema>,
    materializer: RequestMaterializer,
    settings: JobSettings,
    sink: Arc<dyn SchedulerSink>,
    hook: JobHook,
    normalizer: JobNormalizer,
}

impl Scheduler {
    pub fn new(
        schema: Arc<ParameterSchema>,
        materializer: RequestMaterializer,
        settings: JobSettings,
        sink: Arc<dyn SchedulerSink>,
        hook: JobHook,
    ) -> Self {
        Self {
            schema,
            materializer,
            settings,
            sink,
            hook,
            normalizer: JobNormalizer::default(),
        }
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.settings.name = name.into();
        self
    }

    pub fn location(mut self, location: LocationPath) -> Self {
        self.settings.location = location;
        self
    }

    pub fn time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.settings.time_zone = time_zone.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.settings.description = Some(description.into());
        self
    }

    pub fn retry_config(mut self, retry_config: JobRetryConfig) -> Self {
        self.settings.retry_config = Some(retry_config);
        self
    }

    pub fn attempt_deadline(mut self, deadline: Duration) -> Self {
        self.settings.attempt_deadline = Some(deadline);
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.settings.force = force;
        self
    }

    pub fn create_timeout(mut self, timeout: Duration) -> Self {
        self.settings.create_timeout = timeout;
        self
    }

    pub fn normalizer(mut self, normalizer: JobNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// The job creation request this schedule should result in.
    pub fn desired(&self, args: &CallArgs) -> Result<CreateJobRequest, ReconcileError> {
        let request = self.materializer.materialize(&self.schema, args)?;
        let job = Job {
            name: self.settings.job_name(),
            description: self.settings.description.clone(),
            schedule: self.settings.schedule.clone(),
            time_zone: self.settings.time_zone.clone(),
            http_target: HttpTarget::from(request),
            retry_config: self.settings.retry_config.clone(),
            attempt_deadline: self.settings.attempt_deadline,
            state: None,
            status: None,
            schedule_time: None,
            last_attempt_time: None,
            user_update_time: None,
            extra: Default::default(),
        };

        Ok(self.hook.apply(CreateJobRequest {
            parent: self.settings.location.clone(),
            job,
        }))
    }

    /// Compare the desired job with the scheduler's copy.
    pub async fn check(&self, desired: &CreateJobRequest) -> CheckOutcome {
        if self.settings.force {
            return CheckOutcome::Differs(Difference::Forced);
        }

        match self.sink.get_job(&desired.job.name, self.settings.create_timeout).await {
            Ok(current) if self.normalizer.matches_desired(&current, &desired.job) => CheckOutcome::Matches,
            Ok(_) => CheckOutcome::Differs(Difference::Changed),
            Err(err) if err.is_not_found() => CheckOutcome::Differs(Difference::Missing),
            Err(err) => {
                tracing::warn!(job = %desired.job.name, error = %err, "failed to fetch job, replacing it");
                CheckOutcome::Differs(Difference::FetchFailed(err))
            }
        }
    }

    /// Remove the current job. Only logs on failure.
    pub async fn delete_phase(&self, name: &str) -> DeletePhase {
        match self.sink.delete_job(name, self.settings.create_timeout).await {
            Ok(()) => DeletePhase::Deleted,
            Err(err) if err.is_not_found() => DeletePhase::AlreadyAbsent,
            Err(err) => {
                tracing::warn!(job = %name, error = %err, "failed to delete job, creating anyway");
                DeletePhase::Failed(err)
            }
        }
    }

    /// Create the desired job.
    pub async fn create_phase(&self, desired: CreateJobRequest) -> Result<Job, ReconcileError> {
        let name = desired.job.name.clone();
        self.sink
            .create_job(desired, self.settings.create_timeout)
            .await
            .map_err(|source| ReconcileError::Create { name, source })
    }

    /// Make the scheduler hold exactly the desired job for `args`.
    #[tracing::instrument(
        skip(self, args),
        fields(handler = %self.schema.unique_id(), job = %self.settings.job_name(), force = self.settings.force)
    )]
    pub async fn reconcile(&self, args: &CallArgs) -> Result<ReconcileOutcome, ReconcileError> {
        // 1) Desired state
        let desired = self.desired(args)?;

        // 2) Check
        let reason = match self.check(&desired).await {
            CheckOutcome::Matches => {
                tracing::debug!("job unchanged");
                return Ok(ReconcileOutcome::Unchanged);
            }
            CheckOutcome::Differs(reason) => reason,
        };

        // 3) Delete
        let delete = self.delete_phase(&desired.job.name).await;

        // 4) Create
        let job = self.create_phase(desired).await?;

        tracing::info!(reason = ?reason, delete = ?delete, "job applied");
        Ok(ReconcileOutcome::Applied {
            reason,
            delete,
            job: Box::new(job),
        })
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("handler", &self.schema.unique_id())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::OidcToken;
    use crate::hooks::{self, Hook};
    use crate::envelope::OAuthToken;
    use crate::memory::{InMemorySchedulerSink, SchedulerCall};
    use async_trait::async_trait;
    use taskroute_core::{HttpMethod, Param};

    const JOB: &str = "projects/p/locations/l/jobs/timed_hello";

    fn scheduler(sink: Arc<InMemorySchedulerSink>) -> Scheduler {
        let schema = ParameterSchema::builder("timed_hello", HttpMethod::Post, "/scheduled/timed_hello")
            .param(Param::header("x_source").default_value("scheduler"))
            .build()
            .unwrap();
        Scheduler::new(
            Arc::new(schema),
            RequestMaterializer::new("http://localhost:8000/_taskroute").unwrap(),
            JobSettings::new("timed_hello", "projects/p/locations/l".parse().unwrap(), "*/5 * * * *"),
            sink,
            Hook::chain([
                hooks::oidc_token(OidcToken::new("sa@p.iam.gserviceaccount.com")),
                hooks::deadline(Duration::from_secs(30)),
            ]),
        )
        .time_zone("Asia/Kolkata")
    }

    #[tokio::test]
    async fn second_reconcile_is_a_no_op() {
        let sink = InMemorySchedulerSink::arc();
        let s = scheduler(sink.clone());

        let first = s.reconcile(&CallArgs::new()).await.unwrap();
        assert!(matches!(
            first,
            ReconcileOutcome::Applied { reason: Difference::Missing, delete: DeletePhase::AlreadyAbsent, .. }
        ));
        let mutations = sink.mutation_count();

        let second = s.reconcile(&CallArgs::new()).await.unwrap();
        assert_eq!(second, ReconcileOutcome::Unchanged);
        assert_eq!(sink.mutation_count(), mutations);
    }

    #[tokio::test]
    async fn force_always_replaces() {
        let sink = InMemorySchedulerSink::arc();
        let s = scheduler(sink.clone()).force(true);

        s.reconcile(&CallArgs::new()).await.unwrap();
        let again = s.reconcile(&CallArgs::new()).await.unwrap();

        assert!(matches!(
            again,
            ReconcileOutcome::Applied { reason: Difference::Forced, delete: DeletePhase::Deleted, .. }
        ));
        assert!(!sink.calls().iter().any(|c| matches!(c, SchedulerCall::Get(_))));
    }

    #[tokio::test]
    async fn changed_schedule_is_replaced() {
        let sink = InMemorySchedulerSink::arc();
        scheduler(sink.clone()).reconcile(&CallArgs::new()).await.unwrap();

        let changed = scheduler(sink.clone()).time_zone("UTC");
        let outcome = changed.reconcile(&CallArgs::new()).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Applied { reason: Difference::Changed, .. }));
        assert_eq!(sink.job(JOB).unwrap().time_zone, "UTC");
    }

    #[tokio::test]
    async fn changed_arguments_change_the_job() {
        let sink = InMemorySchedulerSink::arc();
        let s = scheduler(sink.clone());
        s.reconcile(&CallArgs::new()).await.unwrap();

        let outcome = s.reconcile(&CallArgs::new().with("x_source", "cron")).await.unwrap();
        assert!(outcome.is_applied());
        assert_eq!(
            sink.job(JOB).unwrap().http_target.headers.get("x-source").map(String::as_str),
            Some("cron")
        );
    }

    #[tokio::test]
    async fn fetch_failure_is_treated_as_different() {
        let sink = InMemorySchedulerSink::arc();
        let s = scheduler(sink.clone());
        s.reconcile(&CallArgs::new()).await.unwrap();

        sink.fail_next_get(SinkError::Api { status: 500, message: "boom".into() });
        let outcome = s.reconcile(&CallArgs::new()).await.unwrap();
        assert!(matches!(
            outcome,
            ReconcileOutcome::Applied { reason: Difference::FetchFailed(_), delete: DeletePhase::Deleted, .. }
        ));
    }

    #[tokio::test]
    async fn delete_failure_only_warns_but_create_failure_is_fatal() {
        let sink = InMemorySchedulerSink::arc();
        let s = scheduler(sink.clone()).force(true);

        sink.fail_next_delete(SinkError::Api { status: 503, message: "unavailable".into() });
        let outcome = s.reconcile(&CallArgs::new()).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Applied { delete: DeletePhase::Failed(_), .. }));

        sink.fail_next_create(SinkError::Api { status: 400, message: "bad cron".into() });
        let err = s.reconcile(&CallArgs::new()).await.unwrap_err();
        assert_eq!(
            err,
            ReconcileError::Create {
                name: JOB.into(),
                source: SinkError::Api { status: 400, message: "bad cron".into() },
            }
        );
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn desired_job_carries_hooks_and_settings() {
        let s = scheduler(InMemorySchedulerSink::arc()).retry_config(JobRetryConfig::fixed(3, Duration::from_secs(10)));
        let desired = s.desired(&CallArgs::new()).unwrap();

        assert_eq!(desired.parent.to_string(), "projects/p/locations/l");
        assert_eq!(desired.job.name, JOB);
        assert_eq!(desired.job.schedule, "*/5 * * * *");
        assert_eq!(desired.job.time_zone, "Asia/Kolkata");
        assert_eq!(desired.job.attempt_deadline, Some(Duration::from_secs(30)));
        assert!(desired.job.http_target.oidc_token.is_some());
        assert_eq!(desired.job.retry_config.unwrap().retry_count, 3);
    }

    #[test]
    fn normalizer_ignores_system_fields_and_injected_headers() {
        let s = scheduler(InMemorySchedulerSink::arc());
        let desired = s.desired(&CallArgs::new()).unwrap().job;

        let mut remote = desired.clone();
        remote.state = Some("PAUSED".into());
        remote.user_update_time = Some(chrono::Utc::now());
        remote.http_target.headers.insert("user-agent".into(), "Google-Cloud-Scheduler".into());

        let normalizer = JobNormalizer::default();
        assert!(normalizer.equivalent(&remote, &desired));
        assert!(!JobNormalizer::empty().equivalent(&remote, &desired));

        remote.extra.insert("platformFlag".into(), Value::Bool(true));
        assert!(!normalizer.equivalent(&remote, &desired));
        assert!(normalizer.ignore_field("platformFlag").equivalent(&remote, &desired));
    }

    /// Hands jobs back the way the REST API does: zero scalars omitted and
    /// unset deadlines and audiences filled with the platform defaults.
    struct WireSchedulerSink(Arc<InMemorySchedulerSink>);

    fn drop_zero_scalars(value: &mut Value) {
        if let Value::Object(map) = value {
            map.retain(|_, v| !matches!(v, Value::Number(n) if n.as_u64() == Some(0)));
            map.values_mut().for_each(drop_zero_scalars);
        }
    }

    #[async_trait]
    impl SchedulerSink for WireSchedulerSink {
        async fn get_job(&self, name: &str, timeout: Duration) -> Result<Job, SinkError> {
            let job = self.0.get_job(name, timeout).await?;
            let mut wire = serde_json::to_value(&job).map_err(|e| SinkError::Decode(e.to_string()))?;
            drop_zero_scalars(&mut wire);
            let mut job: Job = serde_json::from_value(wire).map_err(|e| SinkError::Decode(e.to_string()))?;
            job.attempt_deadline.get_or_insert(Duration::from_secs(180));
            if let Some(token) = job.http_target.oidc_token.as_mut() {
                token.audience.get_or_insert_with(|| job.http_target.uri.clone());
            }
            Ok(job)
        }

        async fn delete_job(&self, name: &str, timeout: Duration) -> Result<(), SinkError> {
            self.0.delete_job(name, timeout).await
        }

        async fn create_job(&self, request: CreateJobRequest, timeout: Duration) -> Result<Job, SinkError> {
            self.0.create_job(request, timeout).await
        }
    }

    fn wire_scheduler(sink: Arc<InMemorySchedulerSink>) -> Scheduler {
        let schema = ParameterSchema::builder("timed_hello", HttpMethod::Post, "/scheduled/timed_hello")
            .build()
            .unwrap();
        Scheduler::new(
            Arc::new(schema),
            RequestMaterializer::new("http://localhost:8000/_taskroute").unwrap(),
            JobSettings::new("timed_hello", "projects/p/locations/l".parse().unwrap(), "*/5 * * * *"),
            Arc::new(WireSchedulerSink(sink)),
            hooks::oidc_token(OidcToken::new("sa@p.iam.gserviceaccount.com")),
        )
    }

    #[tokio::test]
    async fn fixed_retry_config_survives_the_wire_format() {
        let sink = InMemorySchedulerSink::arc();
        let s = wire_scheduler(sink.clone()).retry_config(JobRetryConfig::fixed(3, Duration::from_secs(10)));

        assert!(s.reconcile(&CallArgs::new()).await.unwrap().is_applied());
        let mutations = sink.mutation_count();

        assert_eq!(s.reconcile(&CallArgs::new()).await.unwrap(), ReconcileOutcome::Unchanged);
        assert_eq!(sink.mutation_count(), mutations);
    }

    #[tokio::test]
    async fn platform_defaults_do_not_force_a_replace() {
        let sink = InMemorySchedulerSink::arc();
        let s = wire_scheduler(sink.clone());

        s.reconcile(&CallArgs::new()).await.unwrap();
        assert_eq!(s.reconcile(&CallArgs::new()).await.unwrap(), ReconcileOutcome::Unchanged);

        let explicit = s.attempt_deadline(Duration::from_secs(30));
        assert!(matches!(
            explicit.reconcile(&CallArgs::new()).await.unwrap(),
            ReconcileOutcome::Applied { reason: Difference::Changed, .. }
        ));
    }

    #[test]
    fn unset_values_ignore_server_defaults() {
        let mut desired = scheduler(InMemorySchedulerSink::arc()).desired(&CallArgs::new()).unwrap().job;
        desired.attempt_deadline = None;
        desired.http_target.oauth_token = Some(OAuthToken::new("sa@p.iam.gserviceaccount.com"));

        let mut remote = desired.clone();
        remote.attempt_deadline = Some(Duration::from_secs(180));
        remote.retry_config = Some(JobRetryConfig::exponential(0, Duration::from_secs(5), Duration::from_secs(3600)));
        remote.http_target.oidc_token = Some(OidcToken::new("sa@p.iam.gserviceaccount.com").with_audience("aud"));
        remote.http_target.oauth_token =
            Some(OAuthToken::new("sa@p.iam.gserviceaccount.com").with_scope("https://www.googleapis.com/auth/cloud-platform"));

        let normalizer = JobNormalizer::default();
        assert!(normalizer.matches_desired(&remote, &desired));
        assert!(!normalizer.equivalent(&remote, &desired));

        desired.attempt_deadline = Some(Duration::from_secs(30));
        assert!(!normalizer.matches_desired(&remote, &desired));

        desired.attempt_deadline = None;
        remote.http_target.oidc_token = Some(OidcToken::new("other@p.iam.gserviceaccount.com"));
        assert!(!normalizer.matches_desired(&remote, &desired));
    }
}
