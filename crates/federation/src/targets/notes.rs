//! Note actions: create, update, announce, like, delete and their undos.

use chrono::{DateTime, Utc};
use reqwest::Method;

use super::{TargetError, TargetType, followers_of};
use crate::activities::{Activity, ActivityType};
use crate::objects::{NoteObject, ObjectReference, PUBLIC};

/// A local status to be sent as a Note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft {
    /// Status (note) id.
    pub status_id: String,
    /// Author actor id.
    pub profile: String,
    /// Rendered HTML content.
    pub content: String,
    pub published: DateTime<Utc>,
    /// Content warning.
    pub summary: Option<String>,
    pub sensitive: bool,
    /// Status this one replies to.
    pub in_reply_to: Option<String>,
    /// Author of the status this one replies to. Its presence makes the note
    /// a reply, delivered unlisted.
    pub reply_target_profile: Option<String>,
}

impl NoteDraft {
    /// `(to, cc)` for this note.
    ///
    /// Replies go to the author's followers with the public collection and
    /// the replied-to author in `cc`; top-level posts go to the public
    /// collection with followers in `cc`.
    #[must_use]
    pub fn addressing(&self) -> (Vec<String>, Vec<String>) {
        let followers = followers_of(&self.profile);
        match &self.reply_target_profile {
            Some(reply_target) => (
                vec![followers],
                vec![PUBLIC.to_string(), reply_target.clone()],
            ),
            None => (vec![PUBLIC.to_string()], vec![followers]),
        }
    }

    fn to_note(&self) -> NoteObject {
        let (to, cc) = self.addressing();
        let mut note = NoteObject::new(
            self.status_id.clone(),
            self.profile.clone(),
            self.content.clone(),
        );
        note.published = Some(self.published);
        note.url = Some(self.status_id.clone());
        note.to = Some(to.into());
        note.cc = Some(cc.into());
        note.in_reply_to = self.in_reply_to.clone();
        note.summary = self.summary.clone();
        note.sensitive = self.sensitive;
        note
    }
}

/// Outbound note actions, all POSTed to an inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotesTarget {
    Create(NoteDraft),
    Update {
        note: NoteDraft,
        updated: DateTime<Utc>,
    },
    /// Reblog of `reblog_status_id` (by `reblog_profile`), stored locally as
    /// `status_id`.
    Announce {
        status_id: String,
        profile: String,
        reblog_profile: String,
        reblog_status_id: String,
        published: DateTime<Utc>,
    },
    Unannounce {
        status_id: String,
        profile: String,
        reblog_profile: String,
        reblog_status_id: String,
        published: DateTime<Utc>,
    },
    Like {
        profile: String,
        favourite_id: String,
        status_id: String,
    },
    Unlike {
        profile: String,
        favourite_id: String,
        status_id: String,
    },
    Delete {
        status_id: String,
        profile: String,
    },
}

impl NotesTarget {
    /// The activity document this target sends.
    #[must_use]
    pub fn activity(&self) -> Activity {
        match self {
            Self::Create(draft) => {
                let (to, cc) = draft.addressing();
                Activity::new(
                    ActivityType::Create,
                    format!("{}/activity", draft.status_id),
                    draft.profile.as_str(),
                    draft.to_note(),
                )
                .with_to(to)
                .with_cc(cc)
                .with_published(draft.published)
            }
            Self::Update { note, updated } => {
                let (to, cc) = note.addressing();
                let mut object = note.to_note();
                object.updated = Some(*updated);
                Activity::new(
                    ActivityType::Update,
                    format!("{}#updates/{}", note.status_id, updated.timestamp()),
                    note.profile.as_str(),
                    object,
                )
                .with_to(to)
                .with_cc(cc)
                .with_published(*updated)
            }
            Self::Announce {
                status_id,
                profile,
                reblog_profile,
                reblog_status_id,
                published,
            } => announce(status_id, profile, reblog_profile, reblog_status_id, *published),
            Self::Unannounce {
                status_id,
                profile,
                reblog_profile,
                reblog_status_id,
                published,
            } => {
                let original =
                    announce(status_id, profile, reblog_profile, reblog_status_id, *published);
                Activity::new(
                    ActivityType::Undo,
                    format!("{status_id}#announces/undo"),
                    profile.as_str(),
                    original.embedded(),
                )
                .with_to(vec![PUBLIC.to_string()])
            }
            Self::Like {
                profile,
                favourite_id,
                status_id,
            } => like(profile, favourite_id, status_id),
            Self::Unlike {
                profile,
                favourite_id,
                status_id,
            } => Activity::new(
                ActivityType::Undo,
                format!("{profile}#likes/{favourite_id}/undo"),
                profile.as_str(),
                like(profile, favourite_id, status_id).embedded(),
            ),
            Self::Delete { status_id, profile } => Activity::new(
                ActivityType::Delete,
                format!("{status_id}#delete"),
                profile.as_str(),
                ObjectReference::new(status_id.as_str(), "Note"),
            )
            .with_to(vec![PUBLIC.to_string()]),
        }
    }
}

fn announce(
    status_id: &str,
    profile: &str,
    reblog_profile: &str,
    reblog_status_id: &str,
    published: DateTime<Utc>,
) -> Activity {
    Activity::new(
        ActivityType::Announce,
        format!("{status_id}/activity"),
        profile,
        reblog_status_id,
    )
    .with_to(vec![PUBLIC.to_string()])
    .with_cc(vec![reblog_profile.to_string(), followers_of(profile)])
    .with_published(published)
}

fn like(profile: &str, favourite_id: &str, status_id: &str) -> Activity {
    Activity::new(
        ActivityType::Like,
        format!("{profile}#likes/{favourite_id}"),
        profile,
        status_id,
    )
}

impl TargetType for NotesTarget {
    fn method(&self) -> Method {
        Method::POST
    }

    fn body(&self) -> Result<Option<Vec<u8>>, TargetError> {
        Ok(Some(self.activity().to_canonical_bytes()?))
    }
}
