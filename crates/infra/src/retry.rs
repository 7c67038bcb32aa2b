//! Retry settings of a scheduled job.
//!
//! Only the wire shape lives here; the scheduler itself computes backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the scheduler retries a failed job run.
///
/// Backoff starts at `min_backoff`, doubles `max_doublings` times, then grows
/// linearly by the last doubled step, capped at `max_backoff`.
///
/// The API leaves zero values out of its responses, so every field decodes
/// to zero when missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRetryConfig {
    /// Retries after the first failure (0 = no retries)
    #[serde(default)]
    pub retry_count: u32,
    /// Time limit for retrying; zero means unlimited
    #[serde(with = "duration_str", default)]
    pub max_retry_duration: Duration,
    #[serde(rename = "minBackoffDuration", with = "duration_str", default)]
    pub min_backoff: Duration,
    #[serde(rename = "maxBackoffDuration", with = "duration_str", default)]
    pub max_backoff: Duration,
    #[serde(default)]
    pub max_doublings: u32,
}

impl JobRetryConfig {
    /// A fixed delay between retries.
    pub fn fixed(retry_count: u32, delay: Duration) -> Self {
        Self {
            retry_count,
            max_retry_duration: Duration::ZERO,
            min_backoff: delay,
            max_backoff: delay,
            max_doublings: 0,
        }
    }

    /// Exponential backoff between `min_backoff` and `max_backoff`, with the
    /// platform's default of five doublings.
    pub fn exponential(retry_count: u32, min_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            retry_count,
            max_retry_duration: Duration::ZERO,
            min_backoff,
            max_backoff,
            max_doublings: 5,
        }
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    use crate::envelope::{format_duration, parse_duration};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(d)?;
        parse_duration(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration `{text}`")))
    }
}
