//! `ActivityPub` activities.

#![allow(missing_docs)]

mod activity;
mod kind;

pub use activity::Activity;
pub use kind::ActivityType;
