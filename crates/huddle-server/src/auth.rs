//! Identity of the caller.
//!
//! Authentication happens upstream. By the time a request reaches these
//! handlers the user has been verified; this module only reads the result.

use crate::error::ApiError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName};

/// Resolves the verified user behind a request.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Return the verified user id for a request.
    async fn verify(&self, headers: &HeaderMap) -> Result<String, ApiError>;
}

/// Reads the user id from a header set by the upstream auth layer.
#[derive(Debug, Clone)]
pub struct TrustedHeaderIdentity {
    header: HeaderName,
}

impl TrustedHeaderIdentity {
    /// Create a provider reading `header`.
    ///
    /// # Errors
    ///
    /// Returns an error if `header` is not a valid header name.
    pub fn new(header: &str) -> Result<Self> {
        let header = HeaderName::from_bytes(header.as_bytes())
            .with_context(|| format!("Invalid identity header: {header}"))?;
        Ok(Self { header })
    }
}

#[async_trait]
impl IdentityProvider for TrustedHeaderIdentity {
    async fn verify(&self, headers: &HeaderMap) -> Result<String, ApiError> {
        headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(str::to_string)
            .ok_or(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_trusted_header() {
        let identity = TrustedHeaderIdentity::new("x-user-id").unwrap();

        let mut headers = HeaderMap::new();
        assert!(matches!(
            identity.verify(&headers).await,
            Err(ApiError::Unauthorized)
        ));

        headers.insert("x-user-id", HeaderValue::from_static("  "));
        assert!(identity.verify(&headers).await.is_err());

        headers.insert("x-user-id", HeaderValue::from_static("alice"));
        assert_eq!(identity.verify(&headers).await.unwrap(), "alice");
    }

    #[test]
    fn test_invalid_header_name() {
        assert!(TrustedHeaderIdentity::new("bad header").is_err());
    }
}
