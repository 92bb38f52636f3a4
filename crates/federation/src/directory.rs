//! Actor resolution.
//!
//! The validator and the delivery worker only need to know, for an actor
//! id, where its inbox is and which public key it signs with. Deployments
//! with their own account storage implement [`ActorDirectory`] over it;
//! [`RemoteActorDirectory`] fetches actor documents over the network and
//! keeps them for a TTL. Expired entries are evicted when seen on a lookup
//! and swept out whenever a new record is cached.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use apub_common::{AppError, AppResult, KeyMaterial};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

use crate::actors::ApPerson;
use crate::client::{FederationClient, FederationClientError};
use crate::targets::{PersonTarget, SigningContext};

/// What the engine needs to know about an actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorRecord {
    pub id: String,
    pub inbox: String,
    pub shared_inbox: Option<String>,
    /// Public key, when the actor publishes one.
    pub public_key: Option<KeyMaterial>,
}

impl ActorRecord {
    /// Extract the record from a fetched actor document.
    #[must_use]
    pub fn from_person(person: &ApPerson) -> Self {
        Self {
            id: person.id.clone(),
            inbox: person.inbox.clone(),
            shared_inbox: person.shared_inbox().map(String::from),
            public_key: person
                .public_key
                .as_ref()
                .map(|key| KeyMaterial::public_only(&key.id, &key.public_key_pem)),
        }
    }
}

/// Resolves actor ids to actor records.
#[async_trait]
pub trait ActorDirectory: Send + Sync {
    /// `Ok(None)` when the actor does not exist.
    async fn find_actor(&self, actor_id: &str) -> AppResult<Option<ActorRecord>>;
}

#[derive(Debug, Clone)]
struct CachedActor {
    record: ActorRecord,
    cached_at: DateTime<Utc>,
}

impl CachedActor {
    fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        chrono::Duration::from_std(ttl).map_or(true, |ttl| self.cached_at + ttl < now)
    }
}

/// Directory backed by signed fetches of remote actor documents.
#[derive(Clone)]
pub struct RemoteActorDirectory {
    client: FederationClient,
    /// Identity used for authorized fetch (usually the instance actor).
    ctx: SigningContext,
    ttl: Duration,
    cache: Arc<RwLock<HashMap<String, CachedActor>>>,
}

impl RemoteActorDirectory {
    #[must_use]
    pub fn new(client: FederationClient, ctx: SigningContext, ttl: Duration) -> Self {
        Self {
            client,
            ctx,
            ttl,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Cache a record obtained some other way (e.g. embedded in an activity).
    pub async fn remember(&self, record: ActorRecord) {
        self.remember_at(record, Utc::now()).await;
    }

    async fn remember_at(&self, record: ActorRecord, cached_at: DateTime<Utc>) {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|_, entry| !entry.is_stale(self.ttl, cached_at));
        let evicted = before - cache.len();
        if evicted > 0 {
            debug!(evicted, "Evicted expired actors");
        }
        cache.insert(record.id.clone(), CachedActor { record, cached_at });
    }

    /// Number of cached records, expired or not.
    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Drop a cached record, e.g. after an `Update` of the actor.
    pub async fn invalidate(&self, actor_id: &str) {
        self.cache.write().await.remove(actor_id);
    }

    async fn cached(&self, actor_id: &str, now: DateTime<Utc>) -> Option<ActorRecord> {
        {
            let cache = self.cache.read().await;
            match cache.get(actor_id) {
                None => return None,
                Some(entry) if !entry.is_stale(self.ttl, now) => {
                    return Some(entry.record.clone());
                }
                Some(_) => {}
            }
        }

        let mut cache = self.cache.write().await;
        if cache
            .get(actor_id)
            .is_some_and(|entry| entry.is_stale(self.ttl, now))
        {
            cache.remove(actor_id);
        }
        None
    }

    async fn fetch(&self, actor_id: &str) -> AppResult<Option<ActorRecord>> {
        let url = Url::parse(actor_id)
            .map_err(|e| AppError::BadRequest(format!("invalid actor id {actor_id}: {e}")))?;

        debug!(actor_id = %actor_id, "Fetching remote actor");
        let person: ApPerson = match self
            .client
            .fetch_json(&self.ctx, &PersonTarget::Profile, &url)
            .await
        {
            Ok(person) => person,
            Err(FederationClientError::RemoteRejected {
                status: 404 | 410, ..
            }) => return Ok(None),
            Err(e) => return Err(client_error(&e)),
        };

        if person.id != actor_id {
            return Err(AppError::BadRequest(format!(
                "actor document {} does not match requested id {actor_id}",
                person.id
            )));
        }

        let record = ActorRecord::from_person(&person);
        info!(actor_id = %actor_id, "Cached remote actor");
        self.remember(record.clone()).await;
        Ok(Some(record))
    }
}

fn client_error(err: &FederationClientError) -> AppError {
    if err.is_retryable() {
        AppError::ExternalService(err.to_string())
    } else if err.is_configuration() {
        AppError::Config(err.to_string())
    } else {
        AppError::BadRequest(err.to_string())
    }
}

#[async_trait]
impl ActorDirectory for RemoteActorDirectory {
    async fn find_actor(&self, actor_id: &str) -> AppResult<Option<ActorRecord>> {
        if let Some(record) = self.cached(actor_id, Utc::now()).await {
            return Ok(Some(record));
        }
        self.fetch(actor_id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn directory() -> RemoteActorDirectory {
        let client = FederationClient::with_timeouts(Duration::from_secs(1), Duration::from_secs(1))
            .unwrap();
        RemoteActorDirectory::new(
            client,
            SigningContext::anonymous("apub-engine/test"),
            Duration::from_secs(60),
        )
    }

    fn record() -> ActorRecord {
        ActorRecord {
            id: "https://remote.example/users/bob".to_string(),
            inbox: "https://remote.example/users/bob/inbox".to_string(),
            shared_inbox: None,
            public_key: None,
        }
    }

    #[tokio::test]
    async fn test_cached_record_is_served() {
        let directory = directory();
        directory.remember(record()).await;

        let found = directory.find_actor(&record().id).await.unwrap();
        assert_eq!(found, Some(record()));
    }

    #[tokio::test]
    async fn test_stale_record_is_not_served_from_cache() {
        let directory = directory();
        let long_ago = Utc::now() - chrono::Duration::hours(2);
        directory.remember_at(record(), long_ago).await;

        assert!(directory.cached(&record().id, Utc::now()).await.is_none());
        assert_eq!(directory.cached_len().await, 0);
    }

    #[tokio::test]
    async fn test_expired_records_are_evicted_on_insert() {
        let directory = directory();
        let long_ago = Utc::now() - chrono::Duration::hours(2);
        for n in 0..3 {
            let mut old = record();
            old.id = format!("https://remote.example/users/old{n}");
            directory.remember_at(old, long_ago).await;
        }
        assert_eq!(directory.cached_len().await, 3);

        directory.remember(record()).await;

        assert_eq!(directory.cached_len().await, 1);
        assert_eq!(
            directory.cached(&record().id, Utc::now()).await,
            Some(record())
        );
    }

    #[tokio::test]
    async fn test_invalidate() {
        let directory = directory();
        directory.remember(record()).await;
        directory.invalidate(&record().id).await;

        assert!(directory.cached(&record().id, Utc::now()).await.is_none());
    }

    #[test]
    fn test_record_from_person() {
        let mut person = ApPerson::new("https://remote.example/users/bob", "bob");
        person.public_key = Some(crate::actors::ApPublicKey {
            id: "https://remote.example/users/bob#main-key".to_string(),
            owner: person.id.clone(),
            public_key_pem: "pem".to_string(),
        });

        let record = ActorRecord::from_person(&person);
        assert_eq!(record.inbox, "https://remote.example/users/bob/inbox");
        assert_eq!(
            record.public_key.unwrap().key_id,
            "https://remote.example/users/bob#main-key"
        );
    }
}
