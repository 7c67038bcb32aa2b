use serde::{Deserialize, Serialize};

/// Body shared by the hello handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub message: String,
}

impl Payload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::new("Default")
    }
}
