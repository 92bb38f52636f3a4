//! Actor references.

use serde::de::Error as DeError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An actor named by id, optionally with inline `type` and `name`.
///
/// Serializes as a bare string when only the id is known and as an object
/// otherwise; both shapes decode back to the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorRef {
    /// Actor URI.
    pub id: String,
    /// Actor type (`Person`, `Service`, ...).
    pub kind: Option<String>,
    /// Display name.
    pub name: Option<String>,
}

impl ActorRef {
    /// Reference by id only.
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: None,
            name: None,
        }
    }

    /// Reference with inline attributes.
    #[must_use]
    pub fn with_details(
        id: impl Into<String>,
        kind: impl Into<String>,
        name: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: Some(kind.into()),
            name,
        }
    }

    const fn is_bare(&self) -> bool {
        self.kind.is_none() && self.name.is_none()
    }
}

impl From<&str> for ActorRef {
    fn from(id: &str) -> Self {
        Self::id(id)
    }
}

impl From<String> for ActorRef {
    fn from(id: String) -> Self {
        Self::id(id)
    }
}

impl Serialize for ActorRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_bare() {
            return serializer.serialize_str(&self.id);
        }

        // Keys in sorted order so signed bodies are reproducible.
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.id)?;
        if let Some(name) = &self.name {
            map.serialize_entry("name", name)?;
        }
        if let Some(kind) = &self.kind {
            map.serialize_entry("type", kind)?;
        }
        map.end()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ActorRefRepr {
    Id(String),
    Object {
        id: String,
        #[serde(rename = "type", default)]
        kind: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
}

impl<'de> Deserialize<'de> for ActorRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match ActorRefRepr::deserialize(deserializer) {
            Ok(ActorRefRepr::Id(id)) => Ok(Self::id(id)),
            Ok(ActorRefRepr::Object { id, kind, name }) => Ok(Self { id, kind, name }),
            Err(_) => Err(D::Error::custom(
                "actor must be a URI string or an object with an id",
            )),
        }
    }
}
