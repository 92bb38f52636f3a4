//! Delivery event bookkeeping.
//!
//! Every enqueued job is tracked by a [`DeliveryEvent`]. An event starts
//! `waiting`, each processing attempt bumps `attempts`, and it ends either
//! `success` or `failed`. Nothing moves backwards: a settled event is never
//! reopened, and `attempts` never decreases.
//!
//! A worker claims the event for the length of one attempt. While the claim
//! is held, duplicate jobs for the same event are dropped, and the retry
//! sweep only picks events nobody has queued or attempted within the stale
//! age.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;

use apub_common::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::jobs::{JobPayload, Lane, QueuedJob};

/// Outcome of a delivery event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryResult {
    Waiting,
    Success,
    Failed,
}

/// Bookkeeping record for one queued job and its retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub id: String,
    pub activity_id: Option<String>,
    pub activity_type: String,
    pub lane: Lane,
    pub result: DeliveryResult,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    /// When a job for this event was last pushed.
    pub queued_at: DateTime<Utc>,
    /// When a worker last started an attempt.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// A worker holds the event for its current attempt.
    pub in_flight: bool,
    pub last_error: Option<String>,
    /// The original payload, re-enqueued as is by the retry sweep.
    pub payload: JobPayload,
}

/// What [`DeliveryEventStore::begin_attempt`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// The caller now holds the event; this is attempt number `n`.
    Started(u32),
    /// The event is settled. Drop the job.
    Settled,
    /// Another worker holds the event. Drop the job.
    InFlight,
}

impl DeliveryEvent {
    /// A fresh `waiting` event with no attempts.
    #[must_use]
    pub fn new(id: String, lane: Lane, payload: JobPayload, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            activity_id: payload.activity_id().map(String::from),
            activity_type: payload.activity_type().to_string(),
            lane,
            result: DeliveryResult::Waiting,
            attempts: 0,
            created_at,
            queued_at: created_at,
            last_attempt_at: None,
            in_flight: false,
            last_error: None,
            payload,
        }
    }

    /// Latest of the last push and the last attempt start.
    #[must_use]
    pub fn last_touched(&self) -> DateTime<Utc> {
        self.last_attempt_at
            .map_or(self.queued_at, |at| at.max(self.queued_at))
    }

    /// `waiting`, below the attempts ceiling, and untouched since `cutoff`.
    /// A claim older than `cutoff` belongs to a worker that died mid-job.
    #[must_use]
    pub fn is_stale(&self, cutoff: DateTime<Utc>, max_attempts: u32) -> bool {
        self.result == DeliveryResult::Waiting
            && self.created_at < cutoff
            && self.last_touched() < cutoff
            && self.attempts < max_attempts
    }

    /// The job that (re)runs this event.
    #[must_use]
    pub fn job(&self) -> QueuedJob {
        QueuedJob {
            event_id: self.id.clone(),
            lane: self.lane,
            payload: self.payload.clone(),
        }
    }
}

/// Storage for delivery events.
///
/// Implementations must apply `begin_attempt`, `complete` and
/// `mark_requeued` atomically per event; only the worker holding the claim
/// mutates the event's outcome.
#[async_trait]
pub trait DeliveryEventStore: Send + Sync {
    async fn create(&self, event: DeliveryEvent) -> AppResult<()>;

    async fn get(&self, id: &str) -> AppResult<Option<DeliveryEvent>>;

    /// Claim the event and count one more attempt.
    async fn begin_attempt(&self, id: &str, now: DateTime<Utc>) -> AppResult<Attempt>;

    /// Record the outcome of the current attempt and release the claim.
    /// `Waiting` keeps the event open for the retry sweep and only records
    /// the error.
    async fn complete(
        &self,
        id: &str,
        result: DeliveryResult,
        error: Option<String>,
    ) -> AppResult<()>;

    /// Events for which [`DeliveryEvent::is_stale`] holds, oldest first.
    async fn find_stale(
        &self,
        cutoff: DateTime<Utc>,
        max_attempts: u32,
    ) -> AppResult<Vec<DeliveryEvent>>;

    /// Reserve a stale event for one more push. Returns `false`, changing
    /// nothing, when the event stopped being stale since it was found.
    /// Only the push bookkeeping changes; `attempts` and `result` are left
    /// to the worker that runs the job.
    async fn mark_requeued(
        &self,
        id: &str,
        cutoff: DateTime<Utc>,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;
}

/// In-memory event store.
#[derive(Clone, Default)]
pub struct MemoryDeliveryEventStore {
    events: Arc<RwLock<HashMap<String, DeliveryEvent>>>,
}

impl MemoryDeliveryEventStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// True when no event is stored.
    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl DeliveryEventStore for MemoryDeliveryEventStore {
    async fn create(&self, event: DeliveryEvent) -> AppResult<()> {
        let mut events = self.events.write().await;
        if events.contains_key(&event.id) {
            return Err(AppError::Conflict(format!("delivery event {}", event.id)));
        }
        events.insert(event.id.clone(), event);
        Ok(())
    }

    async fn get(&self, id: &str) -> AppResult<Option<DeliveryEvent>> {
        Ok(self.events.read().await.get(id).cloned())
    }

    async fn begin_attempt(&self, id: &str, now: DateTime<Utc>) -> AppResult<Attempt> {
        let mut events = self.events.write().await;
        let event = events
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("delivery event {id}")))?;
        if event.result != DeliveryResult::Waiting {
            return Ok(Attempt::Settled);
        }
        if event.in_flight {
            return Ok(Attempt::InFlight);
        }
        event.in_flight = true;
        event.last_attempt_at = Some(now);
        event.attempts += 1;
        Ok(Attempt::Started(event.attempts))
    }

    async fn complete(
        &self,
        id: &str,
        result: DeliveryResult,
        error: Option<String>,
    ) -> AppResult<()> {
        let mut events = self.events.write().await;
        let event = events
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("delivery event {id}")))?;
        if event.result != DeliveryResult::Waiting {
            return Err(AppError::Conflict(format!(
                "delivery event {id} already settled as {:?}",
                event.result
            )));
        }
        event.result = result;
        event.in_flight = false;
        if error.is_some() {
            event.last_error = error;
        }
        Ok(())
    }

    async fn find_stale(
        &self,
        cutoff: DateTime<Utc>,
        max_attempts: u32,
    ) -> AppResult<Vec<DeliveryEvent>> {
        let events = self.events.read().await;
        let mut stale: Vec<DeliveryEvent> = events
            .values()
            .filter(|e| e.is_stale(cutoff, max_attempts))
            .cloned()
            .collect();
        stale.sort_by_key(|e| e.created_at);
        Ok(stale)
    }

    async fn mark_requeued(
        &self,
        id: &str,
        cutoff: DateTime<Utc>,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut events = self.events.write().await;
        let event = events
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("delivery event {id}")))?;
        if !event.is_stale(cutoff, max_attempts) {
            return Ok(false);
        }
        event.queued_at = now;
        event.in_flight = false;
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::jobs::DeliverJob;
    use apub_federation::{Activity, ActivityType};

    fn event(id: &str) -> DeliveryEvent {
        let activity = Activity::new(ActivityType::Like, "https://a/u#likes/1", "https://a/u", "https://b/n/1");
        DeliveryEvent::new(
            id.to_string(),
            Lane::Deliver,
            JobPayload::Deliver(DeliverJob::new(
                "https://b/inbox".to_string(),
                activity,
                "https://a/u".to_string(),
            )),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_new_event_is_waiting() {
        let event = event("e1");
        assert_eq!(event.result, DeliveryResult::Waiting);
        assert_eq!(event.attempts, 0);
        assert_eq!(event.activity_type, "Like");
        assert_eq!(event.activity_id.as_deref(), Some("https://a/u#likes/1"));
    }

    #[tokio::test]
    async fn test_attempts_then_success() {
        let store = MemoryDeliveryEventStore::new();
        store.create(event("e1")).await.unwrap();

        assert_eq!(
            store.begin_attempt("e1", Utc::now()).await.unwrap(),
            Attempt::Started(1)
        );
        store
            .complete("e1", DeliveryResult::Waiting, Some("timeout".into()))
            .await
            .unwrap();
        assert_eq!(
            store.begin_attempt("e1", Utc::now()).await.unwrap(),
            Attempt::Started(2)
        );
        store.complete("e1", DeliveryResult::Success, None).await.unwrap();

        let stored = store.get("e1").await.unwrap().unwrap();
        assert_eq!(stored.result, DeliveryResult::Success);
        assert_eq!(stored.attempts, 2);
        assert_eq!(stored.last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_settled_event_never_reopens() {
        let store = MemoryDeliveryEventStore::new();
        store.create(event("e1")).await.unwrap();
        store.begin_attempt("e1", Utc::now()).await.unwrap();
        store.complete("e1", DeliveryResult::Failed, None).await.unwrap();

        assert_eq!(
            store.begin_attempt("e1", Utc::now()).await.unwrap(),
            Attempt::Settled
        );
        assert!(store.complete("e1", DeliveryResult::Success, None).await.is_err());
        assert_eq!(
            store.get("e1").await.unwrap().unwrap().result,
            DeliveryResult::Failed
        );
    }

    #[tokio::test]
    async fn test_claimed_event_rejects_second_worker() {
        let store = MemoryDeliveryEventStore::new();
        store.create(event("e1")).await.unwrap();

        let now = Utc::now();
        assert_eq!(store.begin_attempt("e1", now).await.unwrap(), Attempt::Started(1));
        assert_eq!(store.begin_attempt("e1", now).await.unwrap(), Attempt::InFlight);

        store
            .complete("e1", DeliveryResult::Waiting, Some("timeout".into()))
            .await
            .unwrap();
        assert_eq!(store.begin_attempt("e1", now).await.unwrap(), Attempt::Started(2));
        assert_eq!(store.get("e1").await.unwrap().unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn test_requeue_waits_out_the_stale_age() {
        let store = MemoryDeliveryEventStore::new();
        let created = Utc::now() - chrono::Duration::hours(3);
        let mut old = event("e1");
        old.created_at = created;
        old.queued_at = created;
        store.create(old).await.unwrap();

        let stale_age = chrono::Duration::hours(1);
        let now = Utc::now();
        let cutoff = now - stale_age;
        assert_eq!(store.find_stale(cutoff, 3).await.unwrap().len(), 1);
        assert!(store.mark_requeued("e1", cutoff, 3, now).await.unwrap());

        // Five minutes later the pushed job is still pending.
        let soon = now + chrono::Duration::minutes(5);
        assert!(store.find_stale(soon - stale_age, 3).await.unwrap().is_empty());
        assert!(!store.mark_requeued("e1", soon - stale_age, 3, soon).await.unwrap());

        // A worker that started and never finished is taken over once its
        // claim is older than the stale age.
        store.begin_attempt("e1", soon).await.unwrap();
        let much_later = soon + chrono::Duration::hours(2);
        let cutoff = much_later - stale_age;
        assert_eq!(store.find_stale(cutoff, 3).await.unwrap().len(), 1);
        assert!(store.mark_requeued("e1", cutoff, 3, much_later).await.unwrap());
        assert_eq!(
            store.begin_attempt("e1", much_later).await.unwrap(),
            Attempt::Started(2)
        );
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() {
        let store = MemoryDeliveryEventStore::new();
        store.create(event("e1")).await.unwrap();
        assert!(matches!(
            store.create(event("e1")).await,
            Err(AppError::Conflict(_))
        ));
    }
}
