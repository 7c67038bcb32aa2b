//! Inbound delivery metadata and the redelivery guard.
//!
//! The queue stamps every delivery with `X-CloudTasks-*` headers. A handler
//! that keeps failing is redelivered until the queue's own retry budget runs
//! out; the guard lets it give up earlier by answering success once the retry
//! count reaches a ceiling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inbound delivery header names, lowercase.
pub mod headers {
    pub const QUEUE_NAME: &str = "x-cloudtasks-queuename";
    pub const TASK_NAME: &str = "x-cloudtasks-taskname";
    pub const TASK_RETRY_COUNT: &str = "x-cloudtasks-taskretrycount";
    pub const TASK_EXECUTION_COUNT: &str = "x-cloudtasks-taskexecutioncount";
    pub const TASK_ETA: &str = "x-cloudtasks-tasketa";
    pub const TASK_PREVIOUS_RESPONSE: &str = "x-cloudtasks-taskpreviousresponse";
    pub const TASK_RETRY_REASON: &str = "x-cloudtasks-taskretryreason";
}

/// Default retry ceiling for [`RedeliveryGuard`].
pub const DEFAULT_MAX_RETRIES: u32 = 20;

/// Body message returned when the guard trips.
pub const MAX_RETRIES_EXHAUSTED: &str = "Max retries exhausted";

/// What the queue told us about this delivery.
///
/// Every field is optional on the wire; absent or unparsable values read as
/// zero / empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryMetadata {
    pub queue_name: String,
    pub task_name: String,
    /// Number of previous attempts, starting at 0.
    pub retry_count: u32,
    /// Number of previous attempts that got a response from the handler.
    pub execution_count: u32,
    pub eta: Option<DateTime<Utc>>,
    /// HTTP status of the previous attempt, 0 on the first one.
    pub previous_response: u16,
    pub retry_reason: String,
}

impl DeliveryMetadata {
    /// Collect metadata from header pairs. Names match case-insensitively.
    pub fn from_headers<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut meta = Self::default();
        for (name, value) in pairs {
            let value = value.trim();
            match name.to_ascii_lowercase().as_str() {
                headers::QUEUE_NAME => meta.queue_name = value.to_string(),
                headers::TASK_NAME => meta.task_name = value.to_string(),
                headers::TASK_RETRY_COUNT => meta.retry_count = parse_or_default(name, value),
                headers::TASK_EXECUTION_COUNT => meta.execution_count = parse_or_default(name, value),
                headers::TASK_PREVIOUS_RESPONSE => {
                    meta.previous_response = parse_or_default(name, value)
                }
                headers::TASK_RETRY_REASON => meta.retry_reason = value.to_string(),
                headers::TASK_ETA => meta.eta = parse_eta(value),
                _ => {}
            }
        }
        meta
    }

    pub fn is_first_attempt(&self) -> bool {
        self.retry_count == 0
    }
}

fn parse_or_default<T: core::str::FromStr + Default>(name: &str, value: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        tracing::debug!(header = name, value, "unparsable delivery header, using default");
        T::default()
    })
}

/// ETA is sent as fractional epoch seconds.
fn parse_eta(value: &str) -> Option<DateTime<Utc>> {
    let secs: f64 = value.parse().ok()?;
    if !secs.is_finite() || secs <= 0.0 {
        return None;
    }
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9).round() as u32;
    DateTime::from_timestamp(whole, nanos.min(999_999_999))
}

/// True once `retry_count` has reached `ceiling`.
pub fn should_stop(retry_count: u32, ceiling: u32) -> bool {
    retry_count >= ceiling
}

/// Outcome of checking a delivery against the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    Stop { retry_count: u32, ceiling: u32 },
}

/// Stops redelivery after a fixed number of retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryGuard {
    ceiling: u32,
}

impl RedeliveryGuard {
    pub fn new(ceiling: u32) -> Self {
        Self { ceiling }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn should_stop(&self, retry_count: u32) -> bool {
        should_stop(retry_count, self.ceiling)
    }

    pub fn check(&self, delivery: &DeliveryMetadata) -> GuardDecision {
        if self.should_stop(delivery.retry_count) {
            GuardDecision::Stop {
                retry_count: delivery.retry_count,
                ceiling: self.ceiling,
            }
        } else {
            GuardDecision::Proceed
        }
    }
}

impl Default for RedeliveryGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ceiling_of_two_stops_on_third_attempt() {
        let guard = RedeliveryGuard::new(2);
        let stops: Vec<bool> = (0..3).map(|n| guard.should_stop(n)).collect();
        assert_eq!(stops, vec![false, false, true]);
    }

    #[test]
    fn metadata_parses_all_headers() {
        let meta = DeliveryMetadata::from_headers([
            ("X-CloudTasks-QueueName", "test-queue"),
            ("X-CloudTasks-TaskName", "1234"),
            ("X-CloudTasks-TaskRetryCount", "3"),
            ("X-CloudTasks-TaskExecutionCount", "2"),
            ("X-CloudTasks-TaskETA", "1700000000.5"),
            ("X-CloudTasks-TaskPreviousResponse", "500"),
            ("X-CloudTasks-TaskRetryReason", "HTTP 500"),
            ("User-Agent", "Google-Cloud-Tasks"),
        ]);

        assert_eq!(meta.queue_name, "test-queue");
        assert_eq!(meta.task_name, "1234");
        assert_eq!(meta.retry_count, 3);
        assert_eq!(meta.execution_count, 2);
        assert_eq!(meta.previous_response, 500);
        assert_eq!(meta.retry_reason, "HTTP 500");
        let eta = meta.eta.unwrap();
        assert_eq!(eta.timestamp(), 1_700_000_000);
        assert_eq!(eta.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn absent_or_garbled_headers_default_to_zero() {
        let meta = DeliveryMetadata::from_headers([("x-cloudtasks-taskretrycount", "many")]);
        assert_eq!(meta, DeliveryMetadata::default());
        assert!(meta.is_first_attempt());
    }

    #[test]
    fn check_reports_the_ceiling() {
        let guard = RedeliveryGuard::default();
        let meta = DeliveryMetadata {
            retry_count: 25,
            ..Default::default()
        };
        assert_eq!(
            guard.check(&meta),
            GuardDecision::Stop {
                retry_count: 25,
                ceiling: DEFAULT_MAX_RETRIES
            }
        );
    }

    proptest! {
        #[test]
        fn guard_is_monotonic(ceiling in 0u32..100, n in 0u32..200) {
            let guard = RedeliveryGuard::new(ceiling);
            if guard.should_stop(n) {
                prop_assert!(guard.should_stop(n + 1));
            }
            prop_assert_eq!(guard.should_stop(n), n >= ceiling);
        }
    }
}
