//! Periodic retry sweep.

use std::sync::Arc;
use std::time::Duration;

use apub_common::config::RetryConfig;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::event::DeliveryEventStore;
use crate::queue::{JobProducer, QueueError};
use crate::retry::RetryPolicy;

/// Re-enqueues stuck `waiting` events on a fixed interval.
///
/// The sweep reserves each stale event before pushing it, so a job still
/// waiting in a lane is not pushed a second time. The worker that picks the
/// job up again is what updates `attempts` and `result`.
#[derive(Clone)]
pub struct RetryScheduler {
    events: Arc<dyn DeliveryEventStore>,
    producer: JobProducer,
    policy: RetryPolicy,
    every: Duration,
}

impl RetryScheduler {
    #[must_use]
    pub fn new(
        events: Arc<dyn DeliveryEventStore>,
        producer: JobProducer,
        config: &RetryConfig,
    ) -> Self {
        Self {
            events,
            producer,
            policy: RetryPolicy::from(config),
            every: Duration::from_secs(config.sweep_interval_secs.max(1)),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run one sweep. Returns how many jobs were pushed again.
    ///
    /// A failed push is logged and skipped; the event becomes eligible again
    /// one stale age later.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<usize, QueueError> {
        let cutoff = self.policy.cutoff(now);
        let max_attempts = self.policy.max_attempts;
        let stale = self.events.find_stale(cutoff, max_attempts).await?;

        let mut requeued = 0;
        for event in stale {
            if !self
                .events
                .mark_requeued(&event.id, cutoff, max_attempts, now)
                .await?
            {
                tracing::debug!(event_id = %event.id, "Delivery event picked up since the scan");
                continue;
            }
            match self.producer.requeue(&event).await {
                Ok(()) => {
                    tracing::debug!(
                        event_id = %event.id,
                        lane = %event.lane,
                        attempts = event.attempts,
                        "Requeued stale delivery event"
                    );
                    requeued += 1;
                }
                Err(e) => {
                    tracing::error!(event_id = %event.id, error = %e, "Failed to requeue delivery event");
                }
            }
        }
        Ok(requeued)
    }

    /// Sweep forever on the configured interval.
    pub async fn run(self) {
        let mut interval = interval(self.every);
        loop {
            interval.tick().await;
            match self.sweep_once(Utc::now()).await {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!(count, "Requeued stale delivery events");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Retry sweep failed");
                }
            }
        }
    }

    /// Run the sweep on a background task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
