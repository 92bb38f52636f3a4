//! Actor-to-actor actions: follows, follow responses, actor deletion and
//! profile updates.

use chrono::{DateTime, Utc};
use reqwest::Method;

use super::{TargetError, TargetType};
use crate::activities::{Activity, ActivityType};
use crate::actors::ApPerson;
use crate::objects::{ObjectReference, PUBLIC};

/// Outbound actor actions, all POSTed to an inbox.
#[derive(Debug, Clone, PartialEq)]
pub enum UsersTarget {
    Follow {
        source: String,
        target: String,
        follow_id: i64,
    },
    Unfollow {
        source: String,
        target: String,
        follow_id: i64,
    },
    /// Sent by `target` in answer to `source`'s Follow, whose activity id
    /// was `follow_activity_id`.
    Accept {
        target: String,
        source: String,
        follow_request_id: i64,
        follow_activity_id: String,
    },
    Reject {
        target: String,
        source: String,
        follow_request_id: i64,
        follow_activity_id: String,
    },
    Delete {
        actor: String,
    },
    Update {
        person: Box<ApPerson>,
        updated: DateTime<Utc>,
    },
}

impl UsersTarget {
    /// The activity document this target sends.
    pub fn activity(&self) -> Result<Activity, TargetError> {
        let activity = match self {
            Self::Follow {
                source,
                target,
                follow_id,
            } => follow(format!("{source}#follow/{follow_id}"), source, target),
            Self::Unfollow {
                source,
                target,
                follow_id,
            } => Activity::new(
                ActivityType::Undo,
                format!("{source}#follow/{follow_id}/undo"),
                source.as_str(),
                follow(format!("{source}#follow/{follow_id}"), source, target).embedded(),
            ),
            Self::Accept {
                target,
                source,
                follow_request_id,
                follow_activity_id,
            } => Activity::new(
                ActivityType::Accept,
                format!("{target}#accept/follow/{follow_request_id}"),
                target.as_str(),
                follow(follow_activity_id.clone(), source, target).embedded(),
            ),
            Self::Reject {
                target,
                source,
                follow_request_id,
                follow_activity_id,
            } => Activity::new(
                ActivityType::Reject,
                format!("{target}#reject/follow/{follow_request_id}"),
                target.as_str(),
                follow(follow_activity_id.clone(), source, target).embedded(),
            ),
            Self::Delete { actor } => Activity::new(
                ActivityType::Delete,
                format!("{actor}#delete"),
                actor.as_str(),
                actor.as_str(),
            )
            .with_to(vec![PUBLIC.to_string()]),
            Self::Update { person, updated } => {
                let object: ObjectReference =
                    serde_json::from_value(serde_json::to_value(person.as_ref())?)?;
                Activity::new(
                    ActivityType::Update,
                    format!("{}#updates/{}", person.id, updated.timestamp()),
                    person.id.as_str(),
                    object,
                )
                .with_to(vec![PUBLIC.to_string()])
                .with_published(*updated)
            }
        };
        Ok(activity)
    }
}

fn follow(id: String, source: &str, target: &str) -> Activity {
    Activity::new(ActivityType::Follow, id, source, target)
}

impl TargetType for UsersTarget {
    fn method(&self) -> Method {
        Method::POST
    }

    fn body(&self) -> Result<Option<Vec<u8>>, TargetError> {
        Ok(Some(self.activity()?.to_canonical_bytes()?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{Value, json};

    const ALICE: &str = "https://local.example/users/alice";
    const BOB: &str = "https://remote.example/users/bob";

    fn body(target: &UsersTarget) -> Value {
        serde_json::from_slice(&target.body().unwrap().unwrap()).unwrap()
    }

    #[test]
    fn test_follow() {
        let value = body(&UsersTarget::Follow {
            source: ALICE.to_string(),
            target: BOB.to_string(),
            follow_id: 12,
        });

        assert_eq!(value["id"], format!("{ALICE}#follow/12"));
        assert_eq!(value["actor"], ALICE);
        assert_eq!(value["object"], BOB);
        assert!(value.get("to").is_none());
    }

    #[test]
    fn test_unfollow_wraps_follow() {
        let value = body(&UsersTarget::Unfollow {
            source: ALICE.to_string(),
            target: BOB.to_string(),
            follow_id: 12,
        });

        assert_eq!(value["type"], "Undo");
        assert_eq!(value["id"], format!("{ALICE}#follow/12/undo"));
        assert_eq!(
            value["object"],
            json!({"type": "Follow", "id": format!("{ALICE}#follow/12"), "actor": ALICE, "object": BOB})
        );
    }

    #[test]
    fn test_accept_references_original_follow() {
        let value = body(&UsersTarget::Accept {
            target: ALICE.to_string(),
            source: BOB.to_string(),
            follow_request_id: 3,
            follow_activity_id: "https://remote.example/follows/abc".to_string(),
        });

        assert_eq!(value["id"], format!("{ALICE}#accept/follow/3"));
        assert_eq!(value["actor"], ALICE);
        assert_eq!(value["object"]["id"], "https://remote.example/follows/abc");
        assert_eq!(value["object"]["actor"], BOB);
        assert_eq!(value["object"]["object"], ALICE);
    }

    #[test]
    fn test_reject_id() {
        let value = body(&UsersTarget::Reject {
            target: ALICE.to_string(),
            source: BOB.to_string(),
            follow_request_id: 3,
            follow_activity_id: "https://remote.example/follows/abc".to_string(),
        });

        assert_eq!(value["type"], "Reject");
        assert_eq!(value["id"], format!("{ALICE}#reject/follow/3"));
    }

    #[test]
    fn test_delete_actor() {
        let value = body(&UsersTarget::Delete {
            actor: ALICE.to_string(),
        });

        assert_eq!(value["to"], json!([PUBLIC]));
        assert_eq!(value["object"], ALICE);
    }

    #[test]
    fn test_update_carries_actor_document() {
        let person = ApPerson::new(ALICE, "alice");
        let updated = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let value = body(&UsersTarget::Update {
            person: Box::new(person),
            updated,
        });

        assert_eq!(value["object"]["type"], "Person");
        assert_eq!(value["object"]["preferredUsername"], "alice");
        assert_eq!(value["object"]["inbox"], format!("{ALICE}/inbox"));
    }
}
