//! Job queue and dispatch for apub-engine.
//!
//! This crate moves activities between the network and local state:
//!
//! - **Jobs**: Lanes and the payloads queued on them
//! - **Queue**: In-memory and Redis (apalis) backends, plus the producer
//!   that records a delivery event for every job
//! - **Dispatcher**: Signature checks, per-type handling and event settling
//! - **Workers**: Per-lane worker pools and outbound delivery
//! - **Retry**: Periodic sweep over stuck `waiting` events
//! - **Shared Inbox**: One delivery per remote shared inbox

pub mod dispatcher;
pub mod event;
pub mod jobs;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod shared_inbox;
pub mod workers;

pub use dispatcher::{
    ActivityHandler, DeliveryDispatcher, DispatchError, DispatchOutcome, ErrorClass, Origin,
};
pub use event::{Attempt, DeliveryEvent, DeliveryEventStore, DeliveryResult, MemoryDeliveryEventStore};
pub use jobs::*;
pub use queue::{JobProducer, JobQueue, MemoryJobQueue, QueueError, RedisJobQueue};
pub use retry::RetryPolicy;
pub use scheduler::RetryScheduler;
pub use shared_inbox::{RecipientInfo, group_by_shared_inbox};
pub use workers::*;
