//! The concrete request produced for one call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::method::HttpMethod;

/// A fully formed HTTP request, ready to be wrapped in a task or job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl MaterializedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body decoded as JSON, if there is one.
    pub fn body_json(&self) -> Option<Result<serde_json::Value, serde_json::Error>> {
        self.body.as_deref().map(serde_json::from_slice)
    }
}
