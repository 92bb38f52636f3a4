//! Job queue backends and the producer that feeds them.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use apalis::prelude::*;
use apalis_redis::RedisStorage;
use apub_common::{AppError, IdGenerator};
use apub_federation::{Activity, InboundRequest};
use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::event::{DeliveryEvent, DeliveryEventStore};
use crate::jobs::{DeliverJob, InboxJob, JobPayload, Lane, QueuedJob};
use crate::shared_inbox::{RecipientInfo, group_by_shared_inbox};

/// Queue error type.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Lane {0} is closed")]
    Closed(Lane),
    #[error("Lane {0} does not take inbound requests")]
    WrongLane(Lane),
    #[error("Queue backend error: {0}")]
    Backend(String),
    #[error("Invalid job payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("Delivery event store error: {0}")]
    Events(#[from] AppError),
}

/// Somewhere jobs go to wait for a worker.
///
/// No ordering is promised between jobs of one lane.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn push(&self, job: QueuedJob) -> Result<(), QueueError>;
}

/// In-process queue: one unbounded channel per lane.
pub struct MemoryJobQueue {
    senders: HashMap<Lane, mpsc::UnboundedSender<QueuedJob>>,
    receivers: Mutex<HashMap<Lane, mpsc::UnboundedReceiver<QueuedJob>>>,
}

impl MemoryJobQueue {
    #[must_use]
    pub fn new() -> Self {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for lane in Lane::ALL {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(lane, tx);
            receivers.insert(lane, rx);
        }
        Self {
            senders,
            receivers: Mutex::new(receivers),
        }
    }

    /// Hand out the consuming end of a lane. Each lane has exactly one
    /// receiver; later calls return `None`.
    pub fn take_receiver(&self, lane: Lane) -> Option<mpsc::UnboundedReceiver<QueuedJob>> {
        self.receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&lane)
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn push(&self, job: QueuedJob) -> Result<(), QueueError> {
        let lane = job.lane;
        let sender = self.senders.get(&lane).ok_or(QueueError::Closed(lane))?;
        sender.send(job).map_err(|_| QueueError::Closed(lane))
    }
}

/// Redis queue: one apalis storage per lane, namespaced `{prefix}:{lane}`.
#[derive(Clone)]
pub struct RedisJobQueue {
    storages: HashMap<Lane, RedisStorage<QueuedJob>>,
}

impl RedisJobQueue {
    /// Connect to Redis and set up every lane.
    pub async fn connect(redis_url: &str, prefix: &str) -> Result<Self, QueueError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| QueueError::Backend(e.to_string()))?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        info!(prefix = %prefix, "Connected job queue to Redis");
        Ok(Self::new(conn, prefix))
    }

    /// Set up every lane on an existing connection.
    #[must_use]
    pub fn new(conn: redis::aio::ConnectionManager, prefix: &str) -> Self {
        let storages = Lane::ALL
            .into_iter()
            .map(|lane| {
                let config = apalis_redis::Config::default()
                    .set_namespace(&format!("{prefix}:{lane}"));
                (lane, RedisStorage::new_with_config(conn.clone(), config))
            })
            .collect();
        Self { storages }
    }

    /// The storage backing a lane, for registering an apalis worker on it.
    #[must_use]
    pub fn storage(&self, lane: Lane) -> Option<RedisStorage<QueuedJob>> {
        self.storages.get(&lane).cloned()
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn push(&self, job: QueuedJob) -> Result<(), QueueError> {
        let lane = job.lane;
        let mut storage = self.storage(lane).ok_or(QueueError::Closed(lane))?;
        storage
            .push(job)
            .await
            .map_err(|e| QueueError::Backend(format!("Failed to queue job: {e}")))?;
        Ok(())
    }
}

/// Creates the delivery event for a job, then queues it.
///
/// The event is written first. If the push then fails, the event stays
/// `waiting` and the retry sweep picks it up once it is stale.
#[derive(Clone)]
pub struct JobProducer {
    queue: Arc<dyn JobQueue>,
    events: Arc<dyn DeliveryEventStore>,
    ids: IdGenerator,
}

impl JobProducer {
    #[must_use]
    pub fn new(queue: Arc<dyn JobQueue>, events: Arc<dyn DeliveryEventStore>) -> Self {
        Self {
            queue,
            events,
            ids: IdGenerator::new(),
        }
    }

    /// Queue a received request on an inbound lane. Returns the event id.
    pub async fn enqueue_inbound(
        &self,
        lane: Lane,
        request: InboundRequest,
        recipient: Option<String>,
    ) -> Result<String, QueueError> {
        if !lane.is_inbound() {
            return Err(QueueError::WrongLane(lane));
        }
        let job = InboxJob::from_request(request, recipient)?;
        self.enqueue(lane, JobPayload::Inbound(job)).await
    }

    /// Queue one outbound delivery. Returns the event id.
    pub async fn enqueue_delivery(
        &self,
        inbox: String,
        activity: Activity,
        signing_actor: String,
    ) -> Result<String, QueueError> {
        let job = DeliverJob::new(inbox, activity, signing_actor);
        self.enqueue(Lane::Deliver, JobPayload::Deliver(job)).await
    }

    /// Queue `activity` once per distinct delivery inbox among `recipients`.
    pub async fn enqueue_fanout(
        &self,
        activity: &Activity,
        signing_actor: &str,
        recipients: Vec<RecipientInfo>,
    ) -> Result<Vec<String>, QueueError> {
        let groups = group_by_shared_inbox(recipients);
        info!(
            activity_type = %activity.kind,
            inbox_count = groups.len(),
            "Queueing activity fan-out"
        );

        let mut event_ids = Vec::with_capacity(groups.len());
        for inbox in groups.into_keys() {
            let id = self
                .enqueue_delivery(inbox, activity.clone(), signing_actor.to_string())
                .await?;
            event_ids.push(id);
        }
        Ok(event_ids)
    }

    /// Push an existing event's job again. Used by the retry sweep.
    pub async fn requeue(&self, event: &DeliveryEvent) -> Result<(), QueueError> {
        self.queue.push(event.job()).await
    }

    async fn enqueue(&self, lane: Lane, payload: JobPayload) -> Result<String, QueueError> {
        let event = DeliveryEvent::new(self.ids.generate(), lane, payload, Utc::now());
        let event_id = event.id.clone();
        let job = event.job();
        self.events.create(event).await?;

        match self.queue.push(job).await {
            Ok(()) => debug!(event_id = %event_id, lane = %lane, "Queued job"),
            Err(e) => warn!(
                event_id = %event_id,
                lane = %lane,
                error = %e,
                "Failed to push job, leaving it to the retry sweep"
            ),
        }
        Ok(event_id)
    }
}
