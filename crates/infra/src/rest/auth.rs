//! Bearer tokens for the REST sinks.

use async_trait::async_trait;

use crate::sink::SinkError;

/// Supplies an access token for a set of OAuth scopes.
///
/// `None` sends the request unauthenticated (local emulators).
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self, scopes: &[&str]) -> Result<Option<String>, SinkError>;
}

/// No credentials at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl TokenSource for NoAuth {
    async fn token(&self, _scopes: &[&str]) -> Result<Option<String>, SinkError> {
        Ok(None)
    }
}

/// A fixed bearer token, e.g. from `gcloud auth print-access-token`.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self, _scopes: &[&str]) -> Result<Option<String>, SinkError> {
        Ok(Some(self.0.clone()))
    }
}

#[cfg(feature = "gcp")]
pub use gcp::GcpTokenSource;

#[cfg(feature = "gcp")]
mod gcp {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::TokenSource;
    use crate::sink::SinkError;

    /// Application default credentials, discovered from the environment.
    #[derive(Clone)]
    pub struct GcpTokenSource {
        provider: Arc<dyn gcp_auth::TokenProvider>,
    }

    impl GcpTokenSource {
        pub async fn discover() -> Result<Self, SinkError> {
            let provider = gcp_auth::provider()
                .await
                .map_err(|e| SinkError::Auth(format!("failed to initialize GCP auth: {e}")))?;
            Ok(Self { provider })
        }
    }

    impl std::fmt::Debug for GcpTokenSource {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("GcpTokenSource(..)")
        }
    }

    #[async_trait]
    impl TokenSource for GcpTokenSource {
        async fn token(&self, scopes: &[&str]) -> Result<Option<String>, SinkError> {
            let token = self
                .provider
                .token(scopes)
                .await
                .map_err(|e| SinkError::Auth(format!("failed to get GCP access token: {e}")))?;
            Ok(Some(token.as_str().to_string()))
        }
    }
}
