//! apalis workers over the Redis-backed lanes.

use std::sync::Arc;

use apalis::prelude::*;
use tracing::warn;

use crate::dispatcher::DeliveryDispatcher;
use crate::jobs::{Lane, QueuedJob};
use crate::queue::RedisJobQueue;

/// Worker function for one job from any lane.
///
/// # Errors
/// Returns an error if the job failed. The delivery event already records
/// the failure; the retry sweep, not apalis, decides about retries.
pub async fn lane_job(job: QueuedJob, ctx: Data<Arc<DeliveryDispatcher>>) -> Result<(), Error> {
    match ctx.process(&job).await {
        Ok(_) => Ok(()),
        Err(e) => {
            warn!(event_id = %job.event_id, lane = %job.lane, "Lane job failed");
            let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(e);
            Err(Error::Failed(boxed.into()))
        }
    }
}

/// A monitor with one worker per lane of `queue`.
#[must_use]
pub fn lane_monitor(
    queue: &RedisJobQueue,
    dispatcher: Arc<DeliveryDispatcher>,
    workers_per_lane: usize,
) -> Monitor {
    let mut monitor = Monitor::new();
    for lane in Lane::ALL {
        let Some(storage) = queue.storage(lane) else {
            continue;
        };
        monitor = monitor.register(
            WorkerBuilder::new(lane.as_str())
                .concurrency(workers_per_lane.max(1))
                .data(Arc::clone(&dispatcher))
                .backend(storage)
                .build_fn(lane_job),
        );
    }
    monitor
}
