//! `ActivityPub` object model.
//!
//! The pieces of an activity document that are not activities themselves:
//! the single-or-array union, actor references, notes and the polymorphic
//! `object` property.

#![allow(missing_docs)]

mod actor_ref;
mod complex;
mod note;
mod object_ref;

pub use actor_ref::ActorRef;
pub use complex::ComplexType;
pub use note::NoteObject;
pub use object_ref::{ObjectRef, ObjectReference};

/// The `@context` every outbound document carries.
pub const ACTIVITY_STREAMS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";

/// The special "everyone" collection.
pub const PUBLIC: &str = "https://www.w3.org/ns/activitystreams#Public";
