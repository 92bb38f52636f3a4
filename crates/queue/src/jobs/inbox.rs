//! Received activity processing job.

use apub_federation::{Activity, InboundRequest};
use serde::{Deserialize, Serialize};

/// Job to process a received activity.
///
/// Carries the request exactly as received, since the signature covers the
/// raw method, path, headers and body, plus the activity decoded from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxJob {
    /// Activity decoded from the request body.
    pub activity: Activity,

    /// The received request.
    pub request: InboundRequest,

    /// Local actor whose inbox or outbox received it; `None` for the shared inbox.
    #[serde(default)]
    pub recipient: Option<String>,
}

impl InboxJob {
    /// Decode the activity from the request body.
    pub fn from_request(
        request: InboundRequest,
        recipient: Option<String>,
    ) -> Result<Self, serde_json::Error> {
        let activity = serde_json::from_slice(&request.body)?;
        Ok(Self {
            activity,
            request,
            recipient,
        })
    }
}
