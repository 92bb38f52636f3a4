//! In-process worker pools, one per lane.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::dispatcher::DeliveryDispatcher;
use crate::jobs::{Lane, QueuedJob};
use crate::queue::{MemoryJobQueue, QueueError};

/// Running workers for every lane of a [`MemoryJobQueue`].
///
/// Workers exit once their lane is drained and every sender is gone.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers_per_lane` workers on each lane.
    ///
    /// Fails with [`QueueError::Closed`] when a lane's receiver was already
    /// taken by another pool.
    pub fn spawn(
        queue: &MemoryJobQueue,
        dispatcher: Arc<DeliveryDispatcher>,
        workers_per_lane: usize,
    ) -> Result<Self, QueueError> {
        let mut handles = Vec::new();
        for lane in Lane::ALL {
            let receiver = queue.take_receiver(lane).ok_or(QueueError::Closed(lane))?;
            handles.extend(spawn_lane(
                lane,
                receiver,
                Arc::clone(&dispatcher),
                workers_per_lane,
            ));
        }
        info!(workers_per_lane, "Worker pool started");
        Ok(Self { handles })
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        join_all(self.handles).await;
    }

    /// Stop every worker now. Jobs in flight are abandoned and their events
    /// stay `waiting` for the retry sweep.
    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Spawn `workers` tasks pulling from one lane.
pub fn spawn_lane(
    lane: Lane,
    receiver: mpsc::UnboundedReceiver<QueuedJob>,
    dispatcher: Arc<DeliveryDispatcher>,
    workers: usize,
) -> Vec<JoinHandle<()>> {
    let receiver = Arc::new(Mutex::new(receiver));
    (0..workers.max(1))
        .map(|worker| {
            let receiver = Arc::clone(&receiver);
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                loop {
                    let job = receiver.lock().await.recv().await;
                    let Some(job) = job else {
                        debug!(lane = %lane, worker, "Lane closed, worker exiting");
                        break;
                    };
                    // Failures are recorded and logged by the dispatcher.
                    if let Ok(outcome) = dispatcher.process(&job).await {
                        debug!(lane = %lane, worker, event_id = %job.event_id, ?outcome, "Job done");
                    }
                }
            })
        })
        .collect()
}
