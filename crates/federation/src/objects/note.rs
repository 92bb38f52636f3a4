//! `ActivityPub` Note object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ComplexType;

/// `ActivityPub` Note object as carried inside Create and Update activities.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NoteObject {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub attributed_to: String,
    #[serde(default)]
    pub content: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<ComplexType<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc: Option<ComplexType<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default)]
    pub sensitive: bool,
}

impl NoteObject {
    /// Create a Note with no addressing.
    #[must_use]
    pub fn new(id: String, attributed_to: String, content: String) -> Self {
        Self {
            kind: "Note".to_string(),
            id,
            attributed_to,
            content,
            published: None,
            updated: None,
            url: None,
            to: None,
            cc: None,
            in_reply_to: None,
            summary: None,
            sensitive: false,
        }
    }
}
