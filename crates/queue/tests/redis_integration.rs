//! Redis integration tests.
//!
//! These tests require a running Redis instance.
//! Run with: `cargo test --test redis_integration -- --ignored`
//!
//! Set `REDIS_URL` environment variable to point to your Redis instance.
//! Default: <redis://localhost:6379>

use std::sync::Arc;

use apub_federation::{Activity, ActivityType};
use apub_queue::{
    DeliveryEventStore, DeliveryResult, JobProducer, Lane, MemoryDeliveryEventStore,
    RedisJobQueue,
};

fn get_redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

fn prefix() -> String {
    format!("apub-test-{}", apub_common::IdGenerator::new().generate())
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_redis_connection() {
    let queue = RedisJobQueue::connect(&get_redis_url(), &prefix()).await;
    assert!(queue.is_ok(), "Failed to connect to Redis: {:?}", queue.err());
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_every_lane_has_storage() {
    let queue = RedisJobQueue::connect(&get_redis_url(), &prefix())
        .await
        .expect("Failed to connect to Redis");
    for lane in Lane::ALL {
        assert!(queue.storage(lane).is_some(), "no storage for {lane}");
    }
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_enqueue_delivery() {
    let queue = RedisJobQueue::connect(&get_redis_url(), &prefix())
        .await
        .expect("Failed to connect to Redis");
    let events = Arc::new(MemoryDeliveryEventStore::new());
    let producer = JobProducer::new(Arc::new(queue), events.clone());

    let activity = Activity::new(
        ActivityType::Follow,
        "https://local.example/users/alice#follow/1",
        "https://local.example/users/alice",
        "https://remote.example/users/bob",
    );
    let event_id = producer
        .enqueue_delivery(
            "https://remote.example/users/bob/inbox".to_string(),
            activity,
            "https://local.example/users/alice".to_string(),
        )
        .await
        .expect("Failed to enqueue");

    let event = events
        .get(&event_id)
        .await
        .expect("event store failed")
        .expect("event missing");
    assert_eq!(event.lane, Lane::Deliver);
    assert_eq!(event.result, DeliveryResult::Waiting);
    assert_eq!(event.attempts, 0);
}
