//! Shared inbox fan-out.
//!
//! Recipients on one server that advertise a shared inbox get the activity
//! once, at that shared inbox, instead of once per personal inbox.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use apub_federation::ActorRecord;

/// Where one recipient can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientInfo {
    pub actor_id: String,
    pub inbox: String,
    pub shared_inbox: Option<String>,
}

impl RecipientInfo {
    #[must_use]
    pub const fn new(actor_id: String, inbox: String, shared_inbox: Option<String>) -> Self {
        Self {
            actor_id,
            inbox,
            shared_inbox,
        }
    }

    /// The inbox a delivery should target; the shared inbox when there is one.
    #[must_use]
    pub fn delivery_inbox(&self) -> &str {
        self.shared_inbox.as_deref().unwrap_or(&self.inbox)
    }
}

impl From<&ActorRecord> for RecipientInfo {
    fn from(record: &ActorRecord) -> Self {
        Self::new(
            record.id.clone(),
            record.inbox.clone(),
            record.shared_inbox.clone(),
        )
    }
}

/// Group recipients by delivery inbox. Keys are in sorted order so fan-out
/// enqueues are reproducible.
#[must_use]
pub fn group_by_shared_inbox(
    recipients: Vec<RecipientInfo>,
) -> BTreeMap<String, Vec<RecipientInfo>> {
    let mut groups: BTreeMap<String, Vec<RecipientInfo>> = BTreeMap::new();
    for recipient in recipients {
        groups
            .entry(recipient.delivery_inbox().to_string())
            .or_default()
            .push(recipient);
    }
    groups
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn recipient(actor: &str, shared: Option<&str>) -> RecipientInfo {
        RecipientInfo::new(
            actor.to_string(),
            format!("{actor}/inbox"),
            shared.map(String::from),
        )
    }

    #[test]
    fn test_group_by_shared_inbox() {
        let groups = group_by_shared_inbox(vec![
            recipient("https://example.com/users/alice", Some("https://example.com/inbox")),
            recipient("https://example.com/users/bob", Some("https://example.com/inbox")),
            recipient("https://other.com/users/charlie", None),
        ]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups["https://example.com/inbox"].len(), 2);
        assert_eq!(groups["https://other.com/users/charlie/inbox"].len(), 1);
    }

    #[test]
    fn test_same_actor_twice_is_one_delivery() {
        let groups = group_by_shared_inbox(vec![
            recipient("https://other.com/users/charlie", None),
            recipient("https://other.com/users/charlie", None),
        ]);
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_from_actor_record() {
        let record = ActorRecord {
            id: "https://example.com/users/alice".to_string(),
            inbox: "https://example.com/users/alice/inbox".to_string(),
            shared_inbox: Some("https://example.com/inbox".to_string()),
            public_key: None,
        };
        let info = RecipientInfo::from(&record);
        assert_eq!(info.delivery_inbox(), "https://example.com/inbox");
    }
}
