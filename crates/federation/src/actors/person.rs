//! `ActivityPub` actor document.

use serde::{Deserialize, Serialize};

/// An actor document as served at the actor's id.
///
/// Only the fields the engine reads (or sends in `Update`) are typed; the
/// `type` is kept as a string because `Person`, `Service`, `Application`
/// and `Group` all route the same way.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApPerson {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub inbox: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbox: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub following: Option<String>,

    /// Legacy top-level shared inbox (pre-`endpoints` servers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_inbox: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<ApEndpoints>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<ApPublicKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manually_approves_followers: Option<bool>,
}

/// The `endpoints` block of an actor.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApEndpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_inbox: Option<String>,
}

/// `ActivityPub` public key.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApPublicKey {
    pub id: String,
    pub owner: String,
    pub public_key_pem: String,
}

impl ApPerson {
    /// Create a new Person actor with the conventional collection urls.
    #[must_use]
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            kind: "Person".to_string(),
            inbox: format!("{id}/inbox"),
            preferred_username: Some(username.into()),
            name: None,
            summary: None,
            outbox: Some(format!("{id}/outbox")),
            followers: Some(format!("{id}/followers")),
            following: Some(format!("{id}/following")),
            shared_inbox: None,
            endpoints: None,
            public_key: None,
            manually_approves_followers: None,
            id,
        }
    }

    /// Shared inbox, preferring `endpoints.sharedInbox`.
    #[must_use]
    pub fn shared_inbox(&self) -> Option<&str> {
        self.endpoints
            .as_ref()
            .and_then(|e| e.shared_inbox.as_deref())
            .or(self.shared_inbox.as_deref())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mastodon_style_actor() {
        let json = r#"{
            "@context": ["https://www.w3.org/ns/activitystreams"],
            "type": "Person",
            "id": "https://remote.example/users/bob",
            "inbox": "https://remote.example/users/bob/inbox",
            "preferredUsername": "bob",
            "endpoints": {"sharedInbox": "https://remote.example/inbox"},
            "publicKey": {
                "id": "https://remote.example/users/bob#main-key",
                "owner": "https://remote.example/users/bob",
                "publicKeyPem": "-----BEGIN PUBLIC KEY-----\n...\n-----END PUBLIC KEY-----"
            }
        }"#;
        let person: ApPerson = serde_json::from_str(json).unwrap();

        assert_eq!(person.shared_inbox(), Some("https://remote.example/inbox"));
        assert_eq!(
            person.public_key.unwrap().id,
            "https://remote.example/users/bob#main-key"
        );
    }

    #[test]
    fn test_legacy_shared_inbox() {
        let json = r#"{"type":"Service","id":"https://r/a","inbox":"https://r/a/inbox","sharedInbox":"https://r/inbox"}"#;
        let person: ApPerson = serde_json::from_str(json).unwrap();

        assert_eq!(person.shared_inbox(), Some("https://r/inbox"));
        assert!(person.public_key.is_none());
    }
}
