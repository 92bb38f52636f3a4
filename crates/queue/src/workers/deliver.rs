//! Outbound delivery of queued activities.

use std::sync::Arc;

use apub_common::{AppResult, KeyMaterial};
use apub_federation::{ActivityTarget, FederationClient, FederationClientError, SigningContext};
use async_trait::async_trait;
use tracing::{info, warn};
use url::Url;

use crate::dispatcher::DispatchError;
use crate::jobs::DeliverJob;

/// Supplies the signing keys of local actors.
#[async_trait]
pub trait KeyMaterialProvider: Send + Sync {
    /// Key material for `actor_id`, or `None` when the actor has none.
    async fn key_material(&self, actor_id: &str) -> AppResult<Option<KeyMaterial>>;
}

/// Sends deliver-lane jobs through the [`FederationClient`].
#[derive(Clone)]
pub struct OutboundDelivery {
    client: FederationClient,
    keys: Arc<dyn KeyMaterialProvider>,
    user_agent: String,
}

impl OutboundDelivery {
    #[must_use]
    pub fn new(
        client: FederationClient,
        keys: Arc<dyn KeyMaterialProvider>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            client,
            keys,
            user_agent: user_agent.into(),
        }
    }

    /// Sign and POST one activity to its inbox.
    ///
    /// `410 Gone` counts as delivered: the remote actor no longer exists.
    pub async fn deliver(&self, job: &DeliverJob) -> Result<(), DispatchError> {
        let keys = self
            .keys
            .key_material(&job.signing_actor)
            .await
            .map_err(DispatchError::KeyMaterial)?
            .ok_or_else(|| DispatchError::MissingKeyMaterial(job.signing_actor.clone()))?;
        let inbox =
            Url::parse(&job.inbox).map_err(|_| DispatchError::InvalidInbox(job.inbox.clone()))?;

        let ctx = SigningContext::new(&keys, &self.user_agent);
        let target = ActivityTarget(job.activity.clone());
        match self.client.send(&ctx, &target, &inbox).await {
            Ok(_) => {
                info!(inbox = %job.inbox, "Activity delivered");
                Ok(())
            }
            Err(FederationClientError::RemoteRejected { status: 410, .. }) => {
                warn!(inbox = %job.inbox, "Remote actor gone (410)");
                Ok(())
            }
            Err(e) => Err(DispatchError::Delivery(e)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dispatcher::ErrorClass;
    use apub_federation::{Activity, ActivityType};
    use std::time::Duration;

    struct NoKeys;

    #[async_trait]
    impl KeyMaterialProvider for NoKeys {
        async fn key_material(&self, _actor_id: &str) -> AppResult<Option<KeyMaterial>> {
            Ok(None)
        }
    }

    struct PublicOnly;

    #[async_trait]
    impl KeyMaterialProvider for PublicOnly {
        async fn key_material(&self, actor_id: &str) -> AppResult<Option<KeyMaterial>> {
            Ok(Some(KeyMaterial::public_only(format!("{actor_id}#main-key"), "pem")))
        }
    }

    fn delivery(keys: Arc<dyn KeyMaterialProvider>) -> OutboundDelivery {
        let client =
            FederationClient::with_timeouts(Duration::from_secs(1), Duration::from_secs(1))
                .unwrap();
        OutboundDelivery::new(client, keys, "apub-test/1.0")
    }

    fn job(inbox: &str) -> DeliverJob {
        let activity = Activity::new(
            ActivityType::Follow,
            "https://a.example/u#follow/1",
            "https://a.example/u",
            "https://b.example/u",
        );
        DeliverJob::new(inbox.to_string(), activity, "https://a.example/u".to_string())
    }

    #[tokio::test]
    async fn test_unknown_signer_is_configuration_error() {
        let err = delivery(Arc::new(NoKeys))
            .deliver(&job("https://b.example/inbox"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::MissingKeyMaterial(_)));
        assert_eq!(err.class(), ErrorClass::Configuration);
    }

    #[tokio::test]
    async fn test_public_only_key_fails_before_io() {
        let err = delivery(Arc::new(PublicOnly))
            .deliver(&job("https://b.example/inbox"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Delivery(FederationClientError::MissingPrivateKey)
        ));
        assert_eq!(err.class(), ErrorClass::Configuration);
    }

    #[tokio::test]
    async fn test_invalid_inbox() {
        let err = delivery(Arc::new(PublicOnly))
            .deliver(&job("not a url"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidInbox(_)));
    }
}
