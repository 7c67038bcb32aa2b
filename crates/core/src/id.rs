//! Resource names for queues, scheduler locations, tasks and jobs.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ResourceNameError;

/// `projects/{project}/locations/{location}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocationPath {
    project: String,
    location: String,
}

/// `projects/{project}/locations/{location}/queues/{queue}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueuePath {
    location: LocationPath,
    queue: String,
}

fn check_segment(full: &str, what: &str, value: &str) -> Result<(), ResourceNameError> {
    if value.is_empty() || value.contains('/') {
        return Err(ResourceNameError::new(
            full,
            format!("{what} must be a non-empty segment"),
        ));
    }
    Ok(())
}

impl LocationPath {
    pub fn new(project: impl Into<String>, location: impl Into<String>) -> Result<Self, ResourceNameError> {
        let (project, location) = (project.into(), location.into());
        let full = format!("projects/{project}/locations/{location}");
        check_segment(&full, "project", &project)?;
        check_segment(&full, "location", &location)?;
        Ok(Self { project, location })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Full job name under this location.
    pub fn job_name(&self, job_id: &str) -> String {
        format!("{self}/jobs/{job_id}")
    }
}

impl QueuePath {
    pub fn new(
        project: impl Into<String>,
        location: impl Into<String>,
        queue: impl Into<String>,
    ) -> Result<Self, ResourceNameError> {
        let location = LocationPath::new(project, location)?;
        let queue = queue.into();
        check_segment(&format!("{location}/queues/{queue}"), "queue", &queue)?;
        Ok(Self { location, queue })
    }

    pub fn project(&self) -> &str {
        self.location.project()
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// The location this queue lives in, the default for scheduled jobs.
    pub fn location_path(&self) -> &LocationPath {
        &self.location
    }

    /// Full task name for a caller-chosen task id.
    pub fn task_name(&self, task_id: &str) -> String {
        format!("{self}/tasks/{task_id}")
    }
}

impl core::fmt::Display for LocationPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "projects/{}/locations/{}", self.project, self.location)
    }
}

impl core::fmt::Display for QueuePath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/queues/{}", self.location, self.queue)
    }
}

impl FromStr for LocationPath {
    type Err = ResourceNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split('/').collect::<Vec<_>>().as_slice() {
            ["projects", project, "locations", location] => Self::new(*project, *location),
            _ => Err(ResourceNameError::new(s, "expected projects/*/locations/*")),
        }
    }
}

impl FromStr for QueuePath {
    type Err = ResourceNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split('/').collect::<Vec<_>>().as_slice() {
            ["projects", project, "locations", location, "queues", queue] => {
                Self::new(*project, *location, *queue)
            }
            _ => Err(ResourceNameError::new(
                s,
                "expected projects/*/locations/*/queues/*",
            )),
        }
    }
}

macro_rules! impl_string_conversions {
    ($t:ty) => {
        impl TryFrom<String> for $t {
            type Error = ResourceNameError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.to_string()
            }
        }
    };
}

impl_string_conversions!(LocationPath);
impl_string_conversions!(QueuePath);

/// `projects/{project}/locations/{location}/queues/{queue}`
pub fn queue_path(project: &str, location: &str, queue: &str) -> Result<QueuePath, ResourceNameError> {
    QueuePath::new(project, location, queue)
}

/// `projects/{project}/locations/{location}`
pub fn location_path(project: &str, location: &str) -> Result<LocationPath, ResourceNameError> {
    LocationPath::new(project, location)
}
