//! Error model for schema construction and request materialization.

use thiserror::Error;

/// Result type used by the materializer.
pub type MaterializeResult<T> = Result<T, MaterializeError>;

/// Failure while building a [`crate::ParameterSchema`].
///
/// These surface once, when a handler is bound, never per call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The handler declared a verb outside the supported set.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// The handler bound more than one verb.
    #[error("expected exactly one method, got {0:?}")]
    MultipleMethods(Vec<String>),

    /// The handler bound no verb at all.
    #[error("no method bound")]
    NoMethod,

    /// The path template could not be parsed.
    #[error("malformed path template `{template}`: {reason}")]
    MalformedTemplate { template: String, reason: String },

    /// A template slot has no matching path parameter.
    #[error("path slot `{0}` has no path parameter")]
    UnboundSlot(String),

    /// A path parameter has no matching template slot.
    #[error("path parameter `{0}` does not appear in the template")]
    UnusedPathParam(String),

    /// Two parameters share the same argument name.
    #[error("duplicate parameter `{0}`")]
    DuplicateParam(String),

    /// A declared default could not be encoded.
    #[error("invalid default for `{name}`: {reason}")]
    InvalidDefault { name: String, reason: String },
}

impl SchemaError {
    pub fn malformed(template: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedTemplate {
            template: template.into(),
            reason: reason.into(),
        }
    }
}

/// Failure while turning call arguments into a request.
///
/// All variants are fatal to the call and are never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MaterializeError {
    /// A required parameter is absent and has no default.
    #[error("missing parameter `{0}`")]
    MissingParameter(String),

    /// A value could not be converted to the parameter's wire form.
    #[error("invalid value for `{name}`: expected {expected}")]
    InvalidParameterType { name: String, expected: String },

    /// The body value does not decode as the declared body type.
    #[error("wrong type for `{name}`: expected {expected}")]
    WrongType { name: String, expected: String },

    /// The configured base URL is not an absolute URL.
    #[error("invalid base url `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// JSON encoding failed.
    #[error("encode error: {0}")]
    Encode(String),
}

impl MaterializeError {
    pub fn missing(name: impl Into<String>) -> Self {
        Self::MissingParameter(name.into())
    }

    pub fn invalid_type(name: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::InvalidParameterType {
            name: name.into(),
            expected: expected.into(),
        }
    }

    pub fn wrong_type(name: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::WrongType {
            name: name.into(),
            expected: expected.into(),
        }
    }

    /// Name of the parameter at fault, when there is one.
    pub fn parameter(&self) -> Option<&str> {
        match self {
            Self::MissingParameter(name) => Some(name),
            Self::InvalidParameterType { name, .. } | Self::WrongType { name, .. } => Some(name),
            Self::InvalidBaseUrl { .. } | Self::Encode(_) => None,
        }
    }
}

impl From<serde_json::Error> for MaterializeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err.to_string())
    }
}

/// A queue, location, task or job name that does not follow the
/// `projects/*/locations/*/...` layout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid resource name `{name}`: {reason}")]
pub struct ResourceNameError {
    pub name: String,
    pub reason: String,
}

impl ResourceNameError {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
