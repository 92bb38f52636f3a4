//! The activity document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ActivityType;
use crate::objects::{ACTIVITY_STREAMS_CONTEXT, ActorRef, ComplexType, ObjectRef};

/// An `ActivityPub` activity.
///
/// `actor` and `object` are union types; `object` may nest a whole activity
/// (Undo of an Announce, Accept of a Follow).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Activity {
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    #[serde(rename = "type")]
    pub kind: ActivityType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub actor: ComplexType<ActorRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<ComplexType<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<ComplexType<String>>,

    pub object: ComplexType<ObjectRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Linked-data signature, carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
}

impl Activity {
    /// A top-level activity with the ActivityStreams context and no addressing.
    #[must_use]
    pub fn new(
        kind: ActivityType,
        id: impl Into<String>,
        actor: impl Into<ActorRef>,
        object: impl Into<ObjectRef>,
    ) -> Self {
        Self {
            context: Some(Value::String(ACTIVITY_STREAMS_CONTEXT.to_string())),
            kind,
            id: Some(id.into()),
            actor: ComplexType::Single(actor.into()),
            to: None,
            cc: None,
            object: ComplexType::Single(object.into()),
            summary: None,
            signature: None,
            published: None,
        }
    }

    /// Set `to`.
    #[must_use]
    pub fn with_to(mut self, to: Vec<String>) -> Self {
        self.to = Some(ComplexType::Multiple(to));
        self
    }

    /// Set `cc`.
    #[must_use]
    pub fn with_cc(mut self, cc: Vec<String>) -> Self {
        self.cc = Some(ComplexType::Multiple(cc));
        self
    }

    /// Set `published`.
    #[must_use]
    pub const fn with_published(mut self, published: DateTime<Utc>) -> Self {
        self.published = Some(published);
        self
    }

    /// Drop `@context` so the activity can be nested inside another one.
    #[must_use]
    pub fn embedded(mut self) -> Self {
        self.context = None;
        self
    }

    /// Ids of every actor named by the activity.
    #[must_use]
    pub fn actor_ids(&self) -> Vec<&str> {
        self.actor.iter().map(|actor| actor.id.as_str()).collect()
    }

    /// The signing actor, when exactly one is named.
    #[must_use]
    pub fn single_actor(&self) -> Option<&ActorRef> {
        match &self.actor {
            ComplexType::Single(actor) => Some(actor),
            ComplexType::Multiple(actors) if actors.len() == 1 => actors.first(),
            ComplexType::Multiple(_) => None,
        }
    }

    /// First `object` entry.
    #[must_use]
    pub fn single_object(&self) -> Option<&ObjectRef> {
        self.object.first()
    }

    /// Id of the first `object` entry, whatever its shape.
    #[must_use]
    pub fn object_id(&self) -> Option<&str> {
        self.single_object().and_then(ObjectRef::id)
    }

    /// Serialize with sorted keys, so the same activity always produces the
    /// same bytes (and therefore the same digest and signature).
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let value = serde_json::to_value(self)?;
        serde_json::to_vec(&value)
    }
}
