use std::convert::Infallible;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use taskroute_core::DeliveryMetadata;

/// Delivery context for a request, read from the `X-CloudTasks-*` headers.
///
/// Never rejects: a handler called directly (no queue in between) sees the
/// first-attempt defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryContext(pub DeliveryMetadata);

impl DeliveryContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self(DeliveryMetadata::from_headers(
            headers
                .iter()
                .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
        ))
    }

    pub fn metadata(&self) -> &DeliveryMetadata {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for DeliveryContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}
