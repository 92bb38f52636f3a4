//! Job workers.

mod deliver;
mod lane;
mod redis_lane;

pub use deliver::{KeyMaterialProvider, OutboundDelivery};
pub use lane::{WorkerPool, spawn_lane};
pub use redis_lane::{lane_job, lane_monitor};
