//! Outbound federation client.
//!
//! Turns a [`TargetType`] into one HTTP call and classifies the answer.

use std::time::Duration;

use apub_common::config::FederationConfig;
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::targets::{SigningContext, TargetError, TargetType};

/// Error type for outbound calls.
#[derive(Debug, thiserror::Error)]
pub enum FederationClientError {
    #[error("Signing context has no private key")]
    MissingPrivateKey,
    #[error("Signing context has no user agent")]
    MissingUserAgent,
    #[error("Target URL has no host")]
    MissingHost,
    #[error("Failed to build request: {0}")]
    Target(TargetError),
    #[error("HTTP client setup failed: {0}")]
    Setup(String),
    #[error("Remote rejected request: {status} - {body}")]
    RemoteRejected { status: u16, body: String },
    #[error("Remote unreachable: {0}")]
    Unreachable(String),
    #[error("Invalid response body: {0}")]
    InvalidResponse(String),
}

impl From<TargetError> for FederationClientError {
    fn from(err: TargetError) -> Self {
        match err {
            TargetError::MissingPrivateKey => Self::MissingPrivateKey,
            TargetError::MissingHost => Self::MissingHost,
            other => Self::Target(other),
        }
    }
}

impl FederationClientError {
    /// Configuration errors: the call never left this process.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingPrivateKey
                | Self::MissingUserAgent
                | Self::MissingHost
                | Self::Target(_)
                | Self::Setup(_)
        )
    }

    /// Whether the same call could succeed later.
    ///
    /// Transport failures, 5xx, 408 and 429 are retryable; any other 4xx is
    /// a final answer from the remote.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Unreachable(_) => true,
            Self::RemoteRejected { status, .. } => *status >= 500 || matches!(*status, 408 | 429),
            _ => false,
        }
    }

    /// HTTP status of a rejection.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteRejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Client for signed outbound `ActivityPub` calls.
///
/// Holds no identity: the signing key and user agent come in with every call.
#[derive(Clone)]
pub struct FederationClient {
    client: Client,
}

impl FederationClient {
    /// Create a client with the configured timeouts.
    pub fn new(config: &FederationConfig) -> Result<Self, FederationClientError> {
        Self::with_timeouts(config.request_timeout(), config.connect_timeout())
    }

    /// Create a client with explicit timeouts.
    pub fn with_timeouts(
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, FederationClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| FederationClientError::Setup(e.to_string()))?;

        Ok(Self { client })
    }

    /// Perform one call and return the response body.
    ///
    /// Missing key, user agent or host fail before any network I/O. Non-2xx
    /// answers become [`FederationClientError::RemoteRejected`]; transport
    /// failures and timeouts become [`FederationClientError::Unreachable`].
    pub async fn send<T: TargetType + ?Sized>(
        &self,
        ctx: &SigningContext,
        target: &T,
        base: &Url,
    ) -> Result<String, FederationClientError> {
        let user_agent = ctx
            .user_agent
            .as_deref()
            .ok_or(FederationClientError::MissingUserAgent)?;
        if target.is_signed() && ctx.private_key_pem.is_none() {
            return Err(FederationClientError::MissingPrivateKey);
        }
        if base.host_str().is_none() {
            return Err(FederationClientError::MissingHost);
        }

        let request = target.build(ctx, base, Utc::now())?;
        debug!(
            method = %request.method,
            url = %request.url,
            "Sending federation request"
        );

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .header("user-agent", user_agent);
        for (name, value) in &request.headers {
            // reqwest derives Host from the URL.
            if name != "host" {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FederationClientError::Unreachable(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FederationClientError::Unreachable(e.to_string()))?;

        if status.is_success() {
            debug!(url = %request.url, status = %status, "Federation request succeeded");
            Ok(body)
        } else {
            warn!(
                url = %request.url,
                status = %status,
                "Federation request rejected"
            );
            Err(FederationClientError::RemoteRejected {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Perform one call and decode the JSON response.
    pub async fn fetch_json<D: DeserializeOwned, T: TargetType + ?Sized>(
        &self,
        ctx: &SigningContext,
        target: &T,
        base: &Url,
    ) -> Result<D, FederationClientError> {
        let body = self.send(ctx, target, base).await?;
        serde_json::from_str(&body).map_err(|e| FederationClientError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::targets::{PersonTarget, UsersTarget};
    use apub_common::KeyMaterial;

    fn client() -> FederationClient {
        FederationClient::new(&FederationConfig::default()).unwrap()
    }

    fn follow() -> UsersTarget {
        UsersTarget::Follow {
            source: "https://local.example/users/alice".to_string(),
            target: "https://remote.example/users/bob".to_string(),
            follow_id: 1,
        }
    }

    #[tokio::test]
    async fn test_missing_user_agent_fails_fast() {
        let ctx = SigningContext {
            key_id: "k".to_string(),
            private_key_pem: Some("pem".to_string()),
            user_agent: None,
        };
        // Unroutable address: any I/O attempt would surface as Unreachable.
        let inbox = Url::parse("http://192.0.2.1/inbox").unwrap();

        let result = client().send(&ctx, &follow(), &inbox).await;
        assert!(matches!(result, Err(FederationClientError::MissingUserAgent)));
    }

    #[tokio::test]
    async fn test_missing_private_key_fails_fast() {
        let keys = KeyMaterial::public_only("https://local.example/users/alice#main-key", "pem");
        let ctx = SigningContext::new(&keys, "apub-engine/test");
        let inbox = Url::parse("http://192.0.2.1/inbox").unwrap();

        let result = client().send(&ctx, &PersonTarget::Profile, &inbox).await;
        assert!(matches!(result, Err(FederationClientError::MissingPrivateKey)));
    }

    #[tokio::test]
    async fn test_missing_host_fails_fast() {
        let ctx = SigningContext {
            key_id: "k".to_string(),
            private_key_pem: Some("pem".to_string()),
            user_agent: Some("ua".to_string()),
        };
        let inbox = Url::parse("data:text/plain,inbox").unwrap();

        let result = client().send(&ctx, &follow(), &inbox).await;
        assert!(matches!(result, Err(FederationClientError::MissingHost)));
    }

    #[test]
    fn test_retry_classification() {
        let rejected = |status| FederationClientError::RemoteRejected {
            status,
            body: String::new(),
        };

        assert!(rejected(503).is_retryable());
        assert!(rejected(429).is_retryable());
        assert!(!rejected(401).is_retryable());
        assert!(!rejected(410).is_retryable());
        assert!(FederationClientError::Unreachable("timeout".into()).is_retryable());
        assert!(FederationClientError::MissingHost.is_configuration());
        assert!(!FederationClientError::MissingHost.is_retryable());
    }
}
