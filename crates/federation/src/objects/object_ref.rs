//! The `object` property of an activity.

use std::collections::BTreeMap;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::NoteObject;
use crate::activities::{Activity, ActivityType};

/// What an activity acts on.
///
/// Decoding looks at the JSON shape: strings are ids, objects whose `type`
/// is an activity type are nested activities (Undo of Follow, Accept of
/// Follow, ...), objects with content are notes, anything else is kept as a
/// typed reference.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectRef {
    /// Bare object id.
    Id(String),
    /// A full nested activity.
    Activity(Box<Activity>),
    /// A note.
    Note(Box<NoteObject>),
    /// Any other object, e.g. `{id, type: Tombstone}`.
    Object(ObjectReference),
}

/// An object reference with whatever extra fields it carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectReference {
    pub id: String,
    /// Empty when the sender left `type` out.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(flatten)]
    pub others: BTreeMap<String, Value>,
}

impl ObjectReference {
    /// `{id, type}` with nothing else.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            others: BTreeMap::new(),
        }
    }
}

impl ObjectRef {
    /// Id of the referenced object, whatever its shape.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Id(id) => Some(id),
            Self::Activity(activity) => activity.id.as_deref(),
            Self::Note(note) => Some(&note.id),
            Self::Object(object) => Some(&object.id),
        }
    }

    /// The nested activity, when this is one.
    #[must_use]
    pub fn as_activity(&self) -> Option<&Activity> {
        match self {
            Self::Activity(activity) => Some(activity),
            _ => None,
        }
    }
}

impl From<String> for ObjectRef {
    fn from(id: String) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for ObjectRef {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl From<ObjectReference> for ObjectRef {
    fn from(object: ObjectReference) -> Self {
        Self::Object(object)
    }
}

impl From<Activity> for ObjectRef {
    fn from(activity: Activity) -> Self {
        Self::Activity(Box::new(activity))
    }
}

impl From<NoteObject> for ObjectRef {
    fn from(note: NoteObject) -> Self {
        Self::Note(Box::new(note))
    }
}

impl Serialize for ObjectRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Id(id) => serializer.serialize_str(id),
            Self::Activity(activity) => activity.serialize(serializer),
            Self::Note(note) => note.serialize(serializer),
            Self::Object(object) => object.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ObjectRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;

        if let Value::String(id) = value {
            return Ok(Self::Id(id));
        }
        let Some(map) = value.as_object() else {
            return Err(D::Error::custom("object must be a URI string or an object"));
        };

        let is_activity = map
            .get("type")
            .and_then(Value::as_str)
            .and_then(ActivityType::from_name)
            .is_some();
        let is_note = map.contains_key("attributedTo") && map.contains_key("content");

        if is_activity {
            serde_json::from_value(value)
                .map(|a| Self::Activity(Box::new(a)))
                .map_err(D::Error::custom)
        } else if is_note {
            serde_json::from_value(value)
                .map(|n| Self::Note(Box::new(n)))
                .map_err(D::Error::custom)
        } else {
            serde_json::from_value(value)
                .map(Self::Object)
                .map_err(D::Error::custom)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_bare_id() {
        let object: ObjectRef = serde_json::from_str(r#""https://a/notes/1""#).unwrap();
        assert_eq!(object, ObjectRef::Id("https://a/notes/1".to_string()));
    }

    #[test]
    fn test_decode_nested_activity() {
        let object: ObjectRef = serde_json::from_str(
            r#"{"type":"Follow","id":"https://a/u#follow/1","actor":"https://a/u","object":"https://b/u"}"#,
        )
        .unwrap();

        let activity = object.as_activity().unwrap();
        assert_eq!(activity.kind, ActivityType::Follow);
        assert_eq!(object.id(), Some("https://a/u#follow/1"));
    }

    #[test]
    fn test_decode_note() {
        let object: ObjectRef = serde_json::from_str(
            r#"{"type":"Note","id":"https://a/n/1","attributedTo":"https://a/u","content":"hi"}"#,
        )
        .unwrap();

        assert!(matches!(object, ObjectRef::Note(ref n) if n.content == "hi"));
    }

    #[test]
    fn test_decode_typed_reference_keeps_extras() {
        let json = r#"{"formerType":"Note","id":"https://a/n/1","type":"Tombstone"}"#;
        let object: ObjectRef = serde_json::from_str(json).unwrap();

        match &object {
            ObjectRef::Object(reference) => {
                assert_eq!(reference.kind, "Tombstone");
                assert_eq!(reference.others["formerType"], "Note");
            }
            other => panic!("expected a reference, got {other:?}"),
        }
        assert_eq!(
            serde_json::to_value(&object).unwrap(),
            serde_json::from_str::<Value>(json).unwrap()
        );
    }

    #[test]
    fn test_decode_untyped_reference() {
        let object: ObjectRef = serde_json::from_str(r#"{"id":"https://a/n/1"}"#).unwrap();

        assert_eq!(object, ObjectRef::Object(ObjectReference::new("https://a/n/1", "")));
        assert_eq!(object.id(), Some("https://a/n/1"));
        assert_eq!(
            serde_json::to_value(&object).unwrap(),
            serde_json::json!({"id": "https://a/n/1"})
        );
    }

    #[test]
    fn test_activity_with_untyped_object_decodes() {
        let activity: Activity = serde_json::from_str(
            r#"{"type":"Like","id":"https://b/u#likes/1","actor":"https://b/u","object":{"id":"https://a/n/1"}}"#,
        )
        .unwrap();
        assert_eq!(activity.object_id(), Some("https://a/n/1"));
    }
}
