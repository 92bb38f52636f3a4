//! Job definitions.

#![allow(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};

mod deliver;
mod inbox;

pub use deliver::DeliverJob;
pub use inbox::InboxJob;

/// A queue lane. Each lane has its own worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// Activities posted to the server-wide shared inbox.
    SharedInbox,
    /// Activities posted to one local actor's inbox.
    UserInbox,
    /// Activities a local actor posted to its own outbox.
    UserOutbox,
    /// Local activities on their way to a remote inbox.
    Deliver,
}

impl Lane {
    pub const ALL: [Self; 4] = [
        Self::SharedInbox,
        Self::UserInbox,
        Self::UserOutbox,
        Self::Deliver,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SharedInbox => "shared_inbox",
            Self::UserInbox => "user_inbox",
            Self::UserOutbox => "user_outbox",
            Self::Deliver => "deliver",
        }
    }

    /// Lanes whose jobs carry a received request to verify.
    #[must_use]
    pub const fn is_inbound(self) -> bool {
        !matches!(self, Self::Deliver)
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a job asks a worker to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    Inbound(InboxJob),
    Deliver(DeliverJob),
}

impl JobPayload {
    /// Type of the carried activity, for logs.
    #[must_use]
    pub fn activity_type(&self) -> &str {
        match self {
            Self::Inbound(job) => job.activity.kind.as_str(),
            Self::Deliver(job) => job.activity.kind.as_str(),
        }
    }

    /// Id of the carried activity, when it has one.
    #[must_use]
    pub fn activity_id(&self) -> Option<&str> {
        match self {
            Self::Inbound(job) => job.activity.id.as_deref(),
            Self::Deliver(job) => job.activity.id.as_deref(),
        }
    }
}

/// One unit of work on a lane, tied to the delivery event that tracks it.
///
/// Immutable once enqueued: a retry pushes the same payload again under the
/// same event id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub event_id: String,
    pub lane: Lane,
    pub payload: JobPayload,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use apub_federation::{Activity, ActivityType};

    #[test]
    fn test_job_round_trips_through_json() {
        let activity = Activity::new(
            ActivityType::Follow,
            "https://a/u#follow/1",
            "https://a/u",
            "https://b/u",
        );
        let job = QueuedJob {
            event_id: "01hx".to_string(),
            lane: Lane::Deliver,
            payload: JobPayload::Deliver(DeliverJob::new(
                "https://b/inbox".to_string(),
                activity,
                "https://a/u".to_string(),
            )),
        };

        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["lane"], "deliver");
        assert_eq!(json["payload"]["kind"], "deliver");
        assert_eq!(serde_json::from_value::<QueuedJob>(json).unwrap(), job);
    }

    #[test]
    fn test_inbound_lanes() {
        assert!(Lane::SharedInbox.is_inbound());
        assert!(Lane::UserOutbox.is_inbound());
        assert!(!Lane::Deliver.is_inbound());
    }
}
