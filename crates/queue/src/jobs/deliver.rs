//! `ActivityPub` delivery job.

use apub_federation::Activity;
use serde::{Deserialize, Serialize};

/// Job to deliver an activity to a remote inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverJob {
    /// Target inbox URL.
    pub inbox: String,

    /// Activity to deliver.
    pub activity: Activity,

    /// Local actor whose key signs the request.
    pub signing_actor: String,
}

impl DeliverJob {
    /// Create a new deliver job.
    #[must_use]
    pub const fn new(inbox: String, activity: Activity, signing_actor: String) -> Self {
        Self {
            inbox,
            activity,
            signing_actor,
        }
    }
}
